//! HTTP server
//!
//! - GET /ws - WebSocket carrying the event protocol (one session per socket)
//! - GET /api/sessions - Connected clients and their camera state
//! - GET /api/sessions/:id/stats - Statistics of one session
//! - GET /health - Health check
//! - Optional static UI for everything else

mod handlers;
mod routes;
mod state;
mod ws;

pub use handlers::{ErrorResponse, SessionListResponse};
pub use routes::create_router;
pub use state::AppState;
