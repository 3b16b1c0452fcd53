//! In-memory fakes for the collaborator traits.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use logger::EventLogger;
use parking_lot::Mutex;
use set_score::Side;
use tempfile::TempDir;

use crate::config::{utc_offset_hours, MonitorConfig};
use crate::error::{FeedError, NotifyError, StoreError};
use crate::ports::{FixtureSource, LiveFeed, Notifier, ResultStore};
use crate::task::TaskContext;
use crate::types::{Fixture, LiveResult, LiveSnapshot, PrematchOdds, Recipient, UpcomingFixture};

pub fn now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&utc_offset_hours(3))
}

pub fn fixture(id: &str, favorite: Side, starts_in: TimeDelta) -> Fixture {
    Fixture {
        id:        id.to_string(),
        starts_at: now() + starts_in,
        league:    "Poland PlusLiga".into(),
        home:      "Jastrzebski".into(),
        away:      "Zawiercie".into(),
        home_odds: if favorite == Side::Home { 1.2 } else { 4.1 },
        away_odds: if favorite == Side::Away { 1.2 } else { 4.1 },
        favorite,
    }
}

pub fn snapshot(id: &str, score: &str, home: Option<f64>, away: Option<f64>) -> LiveSnapshot {
    LiveSnapshot {
        fixture_id: id.to_string(),
        score:      score.to_string(),
        home_odds:  home,
        away_odds:  away,
    }
}

// ── Live feed ────────────────────────────────────────────────────────────────

/// Replays scripted replies in order, then repeats `fallback` forever.
pub struct ScriptedFeed {
    script:   Mutex<VecDeque<Result<LiveSnapshot, FeedError>>>,
    fallback: Result<LiveSnapshot, FeedError>,
    calls:    AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(
        script: Vec<Result<LiveSnapshot, FeedError>>,
        fallback: Result<LiveSnapshot, FeedError>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveFeed for ScriptedFeed {
    async fn fetch_snapshot(&self, _fixture_id: &str) -> Result<LiveSnapshot, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub fixtures: Mutex<Vec<Fixture>>,
    pub inserted: Mutex<Vec<LiveResult>>,
    pub updated:  Mutex<Vec<LiveResult>>,
    pub failing:  bool,
}

impl MemoryStore {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self { failing: true, ..Self::default() })
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn insert_fixture(&self, fixture: &Fixture) -> Result<(), StoreError> {
        self.check()?;
        let mut fixtures = self.fixtures.lock();
        if !fixtures.iter().any(|f| f.id == fixture.id) {
            fixtures.push(fixture.clone());
        }
        Ok(())
    }

    async fn insert_live_result(&self, result: &LiveResult) -> Result<(), StoreError> {
        self.check()?;
        self.inserted.lock().push(result.clone());
        Ok(())
    }

    async fn update_live_result(&self, result: &LiveResult) -> Result<(), StoreError> {
        self.check()?;
        self.updated.lock().push(result.clone());
        Ok(())
    }
}

// ── Notifier ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Recipient, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: Recipient, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().push((to, text.to_string()));
        Ok(())
    }
}

// ── Fixture source ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticSource {
    pub upcoming:   Mutex<Vec<UpcomingFixture>>,
    pub odds:       Mutex<HashMap<String, PrematchOdds>>,
    pub odds_calls: AtomicUsize,
    pub list_down:  AtomicBool,   // fetch_upcoming fails while set
}

impl StaticSource {
    pub fn add(&self, fixture: UpcomingFixture, odds: Option<PrematchOdds>) {
        if let Some(odds) = odds {
            self.odds.lock().insert(fixture.id.clone(), odds);
        }
        self.upcoming.lock().push(fixture);
    }

    pub fn odds_calls(&self) -> usize {
        self.odds_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FixtureSource for StaticSource {
    async fn fetch_upcoming(&self, _now: DateTime<FixedOffset>) -> Result<Vec<UpcomingFixture>, FeedError> {
        if self.list_down.load(Ordering::SeqCst) {
            return Err(FeedError::Status { status: 503, endpoint: "upcoming".into() });
        }
        Ok(self.upcoming.lock().clone())
    }

    async fn fetch_prematch_odds(&self, fixture: &UpcomingFixture) -> Result<Option<PrematchOdds>, FeedError> {
        self.odds_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.odds.lock().get(&fixture.id).copied())
    }
}

pub fn upcoming(id: &str, league: &str, starts_in: TimeDelta) -> UpcomingFixture {
    UpcomingFixture {
        id:        id.to_string(),
        starts_at: now() + starts_in,
        league:    league.to_string(),
        home:      "Lube".into(),
        away:      "Perugia".into(),
    }
}

// ── Context ──────────────────────────────────────────────────────────────────

pub struct Harness {
    pub feed:     Arc<ScriptedFeed>,
    pub store:    Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub ctx:      TaskContext,
    _logs:        TempDir,
}

pub fn quick_config() -> MonitorConfig {
    MonitorConfig {
        max_poll_errors: 5,
        ..MonitorConfig::default()
    }
}

pub fn harness(feed: Arc<ScriptedFeed>, store: Arc<MemoryStore>, config: MonitorConfig) -> Harness {
    let logs = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let ctx = TaskContext {
        feed:     feed.clone(),
        store:    store.clone(),
        notifier: notifier.clone(),
        events:   Arc::new(EventLogger::new(logs.path())),
        config:   Arc::new(config),
    };
    Harness { feed, store, notifier, ctx, _logs: logs }
}
