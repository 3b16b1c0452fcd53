//! Collaborator traits. Adapters live in their own crates; tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::error::{FeedError, NotifyError, StoreError};
use crate::types::{Fixture, LiveResult, LiveSnapshot, PrematchOdds, Recipient, UpcomingFixture};

/// Today's fixture list plus pre-match odds.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    async fn fetch_upcoming(&self, now: DateTime<FixedOffset>) -> Result<Vec<UpcomingFixture>, FeedError>;

    /// `Ok(None)` while the bookmaker has not priced the fixture yet.
    async fn fetch_prematch_odds(&self, fixture: &UpcomingFixture) -> Result<Option<PrematchOdds>, FeedError>;
}

#[async_trait]
pub trait LiveFeed: Send + Sync {
    async fn fetch_snapshot(&self, fixture_id: &str) -> Result<LiveSnapshot, FeedError>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Inserting an already stored fixture is a no-op.
    async fn insert_fixture(&self, fixture: &Fixture) -> Result<(), StoreError>;

    async fn insert_live_result(&self, result: &LiveResult) -> Result<(), StoreError>;

    /// Writes winner and final score for the row keyed by `result.fixture_id`.
    async fn update_live_result(&self, result: &LiveResult) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: Recipient, text: &str) -> Result<(), NotifyError>;
}
