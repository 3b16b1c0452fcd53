use set_score::ParseError;
use thiserror::Error;

/// Failures talking to the odds feed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("unexpected payload: {0}")]
    Decode(String),

    #[error("no live data for fixture {0}")]
    NotFound(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Everything a monitoring task can run into while polling.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("live feed: {0}")]
    TransientFetch(#[from] FeedError),

    #[error("fixture {fixture_id}: giving up after {errors} poll errors")]
    ExhaustedRetries { fixture_id: String, errors: u32 },

    #[error("persistence: {0}")]
    Persistence(#[from] StoreError),

    #[error("notify: {0}")]
    Notify(#[from] NotifyError),
}
