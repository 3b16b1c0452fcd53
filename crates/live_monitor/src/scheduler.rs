//! Periodic fixture discovery and task launching.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use logger::{now_iso, FixtureQualifiedEvent, SchedulerCycleEvent, TaskStartedEvent};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier;
use crate::config::MonitorConfig;
use crate::dedup::DedupCache;
use crate::error::FeedError;
use crate::ports::FixtureSource;
use crate::task::{MonitoringTask, TaskContext, TaskReport};
use crate::types::{Fixture, Recipient};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub candidates: usize,
    pub newly_seen: usize,
    pub qualified:  usize,
    pub launched:   usize,
}

struct TaskHandle {
    cancel: CancellationToken,
    join:   JoinHandle<TaskReport>,
}

/// True when `starts_at` is inside `[now - grace, now + lookahead]`.
pub fn in_monitoring_window(starts_at: DateTime<FixedOffset>, now: DateTime<FixedOffset>, config: &MonitorConfig) -> bool {
    starts_at >= now - config.late_start_grace && starts_at <= now + config.lookahead
}

pub struct Scheduler {
    source:    Arc<dyn FixtureSource>,
    ctx:       TaskContext,
    dedup:     DedupCache,
    pending:   Mutex<HashMap<String, Fixture>>,  // qualified, not launched yet
    tasks:     Mutex<HashMap<String, TaskHandle>>,
    recipient: watch::Receiver<Option<Recipient>>,
    shutdown:  CancellationToken,                // parent of every task token
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn FixtureSource>,
        ctx: TaskContext,
        recipient: watch::Receiver<Option<Recipient>>,
    ) -> Self {
        Self {
            source,
            ctx,
            dedup: DedupCache::new(),
            pending: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            recipient,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    fn config(&self) -> &MonitorConfig {
        &self.ctx.config
    }

    /// Runs cycles every `scheduler_interval` until `stop` fires.
    pub async fn run(&self, stop: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config().scheduler_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = Utc::now().with_timezone(&self.config().utc_offset);
            match self.run_cycle(now).await {
                Ok(summary) => debug!(?summary, "scheduler cycle"),
                Err(e) => warn!("fixture list unavailable: {e}"),
            }
        }
        info!("scheduler stopped");
    }

    /// One discovery pass: fetch, classify new candidates, launch what is due.
    /// A failed list fetch still launches due pending fixtures before the error is returned.
    pub async fn run_cycle(&self, now: DateTime<FixedOffset>) -> Result<CycleSummary, FeedError> {
        if self.dedup.roll_day(now.date_naive()) {
            info!(day = %now.date_naive(), "dedup cache rolled over");
        }
        self.drop_stale(now);

        // pending fixtures still launch when the list is down
        let (upcoming, list_error) = match self.source.fetch_upcoming(now).await {
            Ok(upcoming) => (upcoming, None),
            Err(e) => (Vec::new(), Some(e)),
        };
        let mut summary = CycleSummary { candidates: upcoming.len(), ..Default::default() };

        for candidate in upcoming {
            if self.dedup.is_seen(&candidate.id) {
                continue;
            }
            if !self.config().league_filter.allows(&candidate.league) {
                self.dedup.mark_seen(&candidate.id);
                debug!(fixture_id = %candidate.id, league = %candidate.league, "league filtered out");
                continue;
            }

            let odds = match self.source.fetch_prematch_odds(&candidate).await {
                Ok(Some(odds)) => odds,
                Ok(None) => {
                    debug!(fixture_id = %candidate.id, "no pre-match odds yet");
                    continue;
                }
                Err(e) => {
                    warn!(fixture_id = %candidate.id, "pre-match odds: {e}");
                    continue;
                }
            };
            self.dedup.mark_seen(&candidate.id);
            summary.newly_seen += 1;

            let Some(fixture) = classifier::qualify(candidate, odds, self.config().favorite_max_odds) else {
                continue;
            };
            summary.qualified += 1;
            self.accept(fixture).await;
        }

        summary.launched = self.launch_due(now);
        let active = self.active_tasks();

        let _ = self.ctx.events.log(&SchedulerCycleEvent {
            ts:           now_iso(),
            event:        "SCHEDULER_CYCLE",
            candidates:   summary.candidates,
            newly_seen:   summary.newly_seen,
            qualified:    summary.qualified,
            launched:     summary.launched,
            active_tasks: active,
        });
        if summary.qualified > 0 || summary.launched > 0 {
            info!(
                candidates = summary.candidates,
                qualified = summary.qualified,
                launched = summary.launched,
                active,
                "scheduler cycle"
            );
        }
        match list_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn accept(&self, fixture: Fixture) {
        info!(
            fixture_id = %fixture.id,
            league = %fixture.league,
            "favorite {} @ {:.2} ({} vs {})",
            fixture.favorite_name(), fixture.favorite_odds(), fixture.home, fixture.away
        );
        if let Err(e) = self.ctx.store.insert_fixture(&fixture).await {
            warn!(fixture_id = %fixture.id, "persist fixture: {e}");
        }
        let _ = self.ctx.events.log(&FixtureQualifiedEvent {
            ts:         now_iso(),
            event:      "FIXTURE_QUALIFIED",
            fixture_id: fixture.id.clone(),
            league:     fixture.league.clone(),
            home:       fixture.home.clone(),
            away:       fixture.away.clone(),
            starts_at:  fixture.starts_at.to_rfc3339(),
            home_odds:  fixture.home_odds,
            away_odds:  fixture.away_odds,
            favorite:   fixture.favorite.to_string(),
        });
        self.pending.lock().insert(fixture.id.clone(), fixture);
    }

    fn drop_stale(&self, now: DateTime<FixedOffset>) {
        let earliest = now - self.config().late_start_grace;
        self.pending.lock().retain(|_, f| f.starts_at >= earliest);
    }

    /// Launches every pending fixture inside the monitoring window.
    pub fn launch_due(&self, now: DateTime<FixedOffset>) -> usize {
        let due: Vec<Fixture> = self
            .pending
            .lock()
            .values()
            .filter(|f| in_monitoring_window(f.starts_at, now, self.config()))
            .cloned()
            .collect();

        due.into_iter()
            .filter(|f| {
                let launched = self.launch(f.clone(), now);
                self.pending.lock().remove(&f.id);
                launched
            })
            .count()
    }

    /// Claims the fixture id and spawns its task. Returns false when already claimed.
    pub fn launch(&self, fixture: Fixture, now: DateTime<FixedOffset>) -> bool {
        if !self.dedup.try_claim(&fixture.id, now.date_naive()) {
            return false;
        }

        let cancel = self.shutdown.child_token();
        let id = fixture.id.clone();

        let _ = self.ctx.events.log(&TaskStartedEvent {
            ts:         now_iso(),
            event:      "TASK_STARTED",
            fixture_id: id.clone(),
            starts_at:  fixture.starts_at.to_rfc3339(),
            favorite:   fixture.favorite.to_string(),
        });
        info!(fixture_id = %id, starts_at = %fixture.starts_at, "monitoring task launched");

        let task = MonitoringTask::new(fixture, self.ctx.clone(), self.recipient.clone(), cancel.clone());
        let join = tokio::spawn(task.run());
        self.tasks.lock().insert(id, TaskHandle { cancel, join });
        true
    }

    /// Number of running tasks. Finished ones are dropped from the registry.
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, h| !h.join.is_finished());
        tasks.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn cancel(&self, fixture_id: &str) -> bool {
        match self.tasks.lock().get(fixture_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every task and waits for their reports.
    pub async fn shutdown(&self) -> Vec<TaskReport> {
        self.shutdown.cancel();
        let handles: Vec<(String, TaskHandle)> = self.tasks.lock().drain().collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.join.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(fixture_id = %id, "task aborted: {e}"),
            }
        }
        info!(tasks = reports.len(), "all monitoring tasks stopped");
        reports
    }
}
