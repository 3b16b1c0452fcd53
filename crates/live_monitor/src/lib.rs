/// volley-live: Live monitor
/// Favorite classification, per-fixture monitoring tasks and the scheduler that launches them

pub mod classifier;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ports;
pub mod scheduler;
pub mod task;
pub mod types;

#[cfg(test)]
mod testing;

pub use classifier::{classify, qualify, Classification, LeagueFilter};
pub use config::{utc_offset_hours, MonitorConfig};
pub use dedup::DedupCache;
pub use error::{FeedError, MonitorError, NotifyError, StoreError};
pub use ports::{FixtureSource, LiveFeed, Notifier, ResultStore};
pub use scheduler::{in_monitoring_window, CycleSummary, Scheduler};
pub use task::{
    check_set_one, check_set_two, signal_message, FinishReason, MonitoringTask, PollOutcome, SetOneCheck,
    TaskContext, TaskPhase, TaskReport,
};
pub use types::{Fixture, LiveResult, LiveSnapshot, PrematchOdds, Recipient, UpcomingFixture};
pub use set_score::Side;
