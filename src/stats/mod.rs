//! Detection statistics
//!
//! Each session owns one `StatsAggregator` that counts gesture and expression
//! labels and derives occurrences per minute of elapsed time. Snapshots can be
//! written to disk through a `StatsStore`.

mod aggregator;
mod record;
mod store;

pub use aggregator::StatsAggregator;
pub use record::{LabelStats, SessionDuration, StatsRecord, StatsView, MIN_ELAPSED_MINUTES};
pub use store::{JsonFileStore, StatsSnapshot, StatsStore};
