use anyhow::{Context, Result};
use clap::Parser;
use gesture_stream::{
    create_router, AppState, Capabilities, Config, DataUrlEncoder, JsonFileStore, SessionManager,
    SyntheticCamera,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gesture-stream", about = "Gesture and expression annotated camera streaming")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/gesture-stream")]
    config: String,

    /// Address to bind (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gesture_stream=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Camera: {}x{} @ {} fps (mirror: {})",
        cfg.camera.width, cfg.camera.height, cfg.camera.fps, cfg.camera.mirror
    );
    info!("Statistics directory: {}", cfg.stats.dir.display());

    let capabilities = Capabilities::new(Arc::new(SyntheticCamera::new(cfg.capture_config())))
        .with_encoder(Arc::new(DataUrlEncoder::new(cfg.camera.jpeg_quality)))
        .with_stats_store(Arc::new(JsonFileStore::new(cfg.stats.dir.clone())));

    let manager = Arc::new(SessionManager::new(capabilities, cfg.session_config()));
    let state = AppState::new(Arc::clone(&manager))
        .with_heartbeat(cfg.heartbeat_interval(), cfg.idle_timeout());
    let app = create_router(state, cfg.service.http.static_dir.clone());

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{} (WebSocket at /ws)", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    manager.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, shutting down");
    }
}
