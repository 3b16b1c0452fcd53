//! Per-fixture monitoring task.
//!
//! A task waits for the scheduled start, then polls the live feed in two
//! phases. Phase 1 watches for the pre-match favorite dropping set 1 while the
//! market has drifted away from it; that raises a signal. Phase 2 keeps polling
//! the same fixture until set 2 is decided and records who took it. Both phases
//! share one absolute deadline, fixed when polling begins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use logger::{now_iso, EventLogger, LiveSignalEvent, TaskFinishedEvent};
use serde::Serialize;
use set_score::{MatchScore, ParseError, Side};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::ports::{LiveFeed, Notifier, ResultStore};
use crate::types::{Fixture, LiveResult, LiveSnapshot, Recipient};

/// Collaborators shared by every task.
#[derive(Clone)]
pub struct TaskContext {
    pub feed:     Arc<dyn LiveFeed>,
    pub store:    Arc<dyn ResultStore>,
    pub notifier: Arc<dyn Notifier>,
    pub events:   Arc<EventLogger>,
    pub config:   Arc<MonitorConfig>,
}

// ── Phases and outcomes ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPhase {
    AwaitingStart,
    WatchingSetOne,
    SignalSent,
    WatchingSetTwo,
    Completed,
    TimedOut,
    Failed,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::AwaitingStart  => "AWAITING_START",
            TaskPhase::WatchingSetOne => "WATCHING_SET_ONE",
            TaskPhase::SignalSent     => "SIGNAL_SENT",
            TaskPhase::WatchingSetTwo => "WATCHING_SET_TWO",
            TaskPhase::Completed      => "COMPLETED",
            TaskPhase::TimedOut       => "TIMED_OUT",
            TaskPhase::Failed         => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskPhase::Completed | TaskPhase::TimedOut | TaskPhase::Failed)
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision taken after a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Signaled,
    SetThreeReached,
    Errored,
    Continue,
}

/// Why a task reached its terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    SetTwoDecided(Side),
    /// The decider opened before set 1 produced a signal.
    MissedWindow,
    DeadlineExceeded,
    RetriesExhausted,
    Cancelled,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::SetTwoDecided(side) => write!(f, "set 2 won by {side}"),
            FinishReason::MissedWindow        => f.write_str("match moved past set 2 without a signal"),
            FinishReason::DeadlineExceeded    => f.write_str("lifetime elapsed"),
            FinishReason::RetriesExhausted    => f.write_str("poll error ceiling reached"),
            FinishReason::Cancelled           => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub fixture_id: String,
    pub phase:      TaskPhase,
    pub reason:     FinishReason,
    pub polls:      u32,
    pub errors:     u32,
    pub last_score: Option<String>,
    /// Present once a signal was raised.
    pub result:     Option<LiveResult>,
}

// ── Per-snapshot decisions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetOneCheck {
    pub set_count: usize,
    pub signal:    bool,
}

impl SetOneCheck {
    pub fn outcome(&self) -> PollOutcome {
        if self.signal {
            PollOutcome::Signaled
        } else if self.set_count >= 3 {
            PollOutcome::SetThreeReached
        } else {
            PollOutcome::Continue
        }
    }
}

/// Phase 1 rule: set 2 is running, the favorite lost set 1, and its live odds
/// are strictly above `min_odds`. Missing odds never signal.
pub fn check_set_one(favorite: Side, snapshot: &LiveSnapshot, min_odds: f64) -> Result<SetOneCheck, ParseError> {
    let score = MatchScore::parse(&snapshot.fixture_id, &snapshot.score)?;
    let set_count = score.set_count();
    let signal = set_count == 2
        && score.first_set_winner().is_some_and(|w| w != favorite)
        && snapshot.odds_for(favorite).is_some_and(|o| o > min_odds);
    Ok(SetOneCheck { set_count, signal })
}

/// Phase 2 rule: the set 2 winner, available once the feed has opened a third entry.
pub fn check_set_two(snapshot: &LiveSnapshot) -> Result<Option<Side>, ParseError> {
    let score = MatchScore::parse(&snapshot.fixture_id, &snapshot.score)?;
    if score.set_count() < 3 {
        return Ok(None);
    }
    Ok(score.second_set_winner())
}

pub fn signal_message(fixture: &Fixture, result: &LiveResult) -> String {
    let odds = |o: Option<f64>| o.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    format!(
        "🏐 Favorite lost set 1\n\
         {league}\n\
         {home} vs {away}\n\
         score: {score}\n\
         favorite: {fav} ({fav_side}, pre-match {pre:.2})\n\
         live odds: {home_odds} / {away_odds}\n\
         event: {id}",
        league    = fixture.league,
        home      = fixture.home,
        away      = fixture.away,
        score     = result.score_at_signal,
        fav       = fixture.favorite_name(),
        fav_side  = fixture.favorite,
        pre       = fixture.favorite_odds(),
        home_odds = odds(result.last_home_odds),
        away_odds = odds(result.last_away_odds),
        id        = fixture.id,
    )
}

// ── Task ─────────────────────────────────────────────────────────────────────

struct Exit {
    phase:  TaskPhase,
    reason: FinishReason,
}

impl Exit {
    fn timed_out(reason: FinishReason) -> Self {
        Self { phase: TaskPhase::TimedOut, reason }
    }
}

pub struct MonitoringTask {
    fixture:        Fixture,
    ctx:            TaskContext,
    recipient:      watch::Receiver<Option<Recipient>>,  // read when the signal fires
    cancel:         CancellationToken,
    phase:          TaskPhase,
    deadline:       Option<Instant>,
    polls:          u32,
    errors:         u32,
    last_snapshot:  Option<LiveSnapshot>,
    set_two_winner: Option<Side>,
    result:         Option<LiveResult>,
}

impl MonitoringTask {
    pub fn new(
        fixture: Fixture,
        ctx: TaskContext,
        recipient: watch::Receiver<Option<Recipient>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fixture,
            ctx,
            recipient,
            cancel,
            phase: TaskPhase::AwaitingStart,
            deadline: None,
            polls: 0,
            errors: 0,
            last_snapshot: None,
            set_two_winner: None,
            result: None,
        }
    }

    pub fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    /// Runs the task to a terminal phase.
    pub async fn run(mut self) -> TaskReport {
        let exit = self.drive().await;
        self.finish(exit)
    }

    async fn drive(&mut self) -> Exit {
        if let Err(exit) = self.wait_for_start().await {
            return exit;
        }
        self.deadline = Some(Instant::now() + self.ctx.config.task_lifetime);

        self.enter(TaskPhase::WatchingSetOne);
        if let Err(exit) = self.watch_set_one().await {
            return exit;
        }

        self.enter(TaskPhase::SignalSent);
        self.announce_signal().await;

        self.enter(TaskPhase::WatchingSetTwo);
        match self.watch_set_two().await {
            Ok(winner) => {
                self.finalize(winner).await;
                Exit { phase: TaskPhase::Completed, reason: FinishReason::SetTwoDecided(winner) }
            }
            Err(exit) => exit,
        }
    }

    fn enter(&mut self, phase: TaskPhase) {
        debug!(fixture_id = %self.fixture.id, from = %self.phase, to = %phase, "phase change");
        self.phase = phase;
    }

    async fn wait_for_start(&mut self) -> Result<(), Exit> {
        self.guard()?;
        let now = Utc::now().with_timezone(&self.ctx.config.utc_offset);
        if let Ok(wait) = (self.fixture.starts_at - now).to_std() {
            if !wait.is_zero() {
                info!(
                    fixture_id = %self.fixture.id,
                    starts_at = %self.fixture.starts_at,
                    "waiting {}s for start", wait.as_secs()
                );
                self.pause(wait).await?;
            }
        }
        Ok(())
    }

    async fn watch_set_one(&mut self) -> Result<(), Exit> {
        loop {
            self.guard()?;
            match self.poll_set_one().await {
                PollOutcome::Signaled        => return Ok(()),
                PollOutcome::SetThreeReached => return Err(Exit::timed_out(FinishReason::MissedWindow)),
                PollOutcome::Errored         => self.back_off().await?,
                PollOutcome::Continue        => self.pause(self.ctx.config.poll_interval).await?,
            }
        }
    }

    async fn watch_set_two(&mut self) -> Result<Side, Exit> {
        loop {
            self.guard()?;
            match self.poll_set_two().await {
                PollOutcome::SetThreeReached => {
                    if let Some(winner) = self.set_two_winner {
                        return Ok(winner);
                    }
                    self.pause(self.ctx.config.poll_interval).await?
                }
                PollOutcome::Errored => self.back_off().await?,
                PollOutcome::Signaled | PollOutcome::Continue => {
                    self.pause(self.ctx.config.poll_interval).await?
                }
            }
        }
    }

    // ── Polling ──

    async fn fetch(&mut self) -> Result<LiveSnapshot, MonitorError> {
        self.polls += 1;
        Ok(self.ctx.feed.fetch_snapshot(&self.fixture.id).await?)
    }

    async fn poll_set_one(&mut self) -> PollOutcome {
        let favorite = self.fixture.favorite;
        let min_odds = self.ctx.config.live_min_favorite_odds;
        let polled = self.fetch().await.and_then(|snapshot| -> Result<_, MonitorError> {
            let check = check_set_one(favorite, &snapshot, min_odds)?;
            Ok((snapshot, check))
        });

        match polled {
            Ok((snapshot, check)) => {
                debug!(fixture_id = %self.fixture.id, score = %snapshot.score, sets = check.set_count, "set 1 poll");
                self.last_snapshot = Some(snapshot);
                check.outcome()
            }
            Err(err) => self.poll_failed(err),
        }
    }

    async fn poll_set_two(&mut self) -> PollOutcome {
        let polled = self.fetch().await.and_then(|snapshot| -> Result<_, MonitorError> {
            let winner = check_set_two(&snapshot)?;
            Ok((snapshot, winner))
        });

        match polled {
            Ok((snapshot, winner)) => {
                debug!(fixture_id = %self.fixture.id, score = %snapshot.score, "set 2 poll");
                self.last_snapshot = Some(snapshot);
                match winner {
                    Some(side) => {
                        self.set_two_winner = Some(side);
                        PollOutcome::SetThreeReached
                    }
                    None => PollOutcome::Continue,
                }
            }
            Err(err) => self.poll_failed(err),
        }
    }

    fn poll_failed(&mut self, err: MonitorError) -> PollOutcome {
        self.errors += 1;
        warn!(fixture_id = %self.fixture.id, phase = %self.phase, errors = self.errors, "poll failed: {err}");
        PollOutcome::Errored
    }

    // ── Timing ──

    /// Checked at the top of every poll.
    fn guard(&self) -> Result<(), Exit> {
        if self.cancel.is_cancelled() {
            return Err(Exit::timed_out(FinishReason::Cancelled));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Exit::timed_out(FinishReason::DeadlineExceeded));
        }
        Ok(())
    }

    async fn pause(&self, period: Duration) -> Result<(), Exit> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Exit::timed_out(FinishReason::Cancelled)),
            _ = tokio::time::sleep(period) => Ok(()),
        }
    }

    async fn back_off(&self) -> Result<(), Exit> {
        if self.errors >= self.ctx.config.max_poll_errors {
            let err = MonitorError::ExhaustedRetries {
                fixture_id: self.fixture.id.clone(),
                errors:     self.errors,
            };
            error!("{err}");
            return Err(Exit { phase: TaskPhase::Failed, reason: FinishReason::RetriesExhausted });
        }
        self.pause(self.ctx.config.error_backoff).await
    }

    // ── Results ──

    async fn announce_signal(&mut self) {
        let snapshot = self.last_snapshot.as_ref();
        let result = LiveResult {
            fixture_id:      self.fixture.id.clone(),
            favorite:        self.fixture.favorite,
            last_home_odds:  snapshot.and_then(|s| s.home_odds),
            last_away_odds:  snapshot.and_then(|s| s.away_odds),
            score_at_signal: snapshot.map(|s| s.score.clone()).unwrap_or_default(),
            set_two_winner:  None,
            final_score:     None,
            created_at:      Utc::now().with_timezone(&self.ctx.config.utc_offset),
        };

        info!(
            fixture_id = %self.fixture.id,
            score = %result.score_at_signal,
            "🚨 {} lost set 1 as favorite", self.fixture.favorite_name()
        );

        if let Err(e) = self.ctx.store.insert_live_result(&result).await {
            warn!(fixture_id = %self.fixture.id, "{}", MonitorError::from(e));
        }

        let text = signal_message(&self.fixture, &result);
        let recipient = *self.recipient.borrow();
        match recipient {
            Some(to) => {
                if let Err(e) = self.ctx.notifier.send(to, &text).await {
                    warn!(fixture_id = %self.fixture.id, "{}", MonitorError::from(e));
                }
            }
            None => warn!(fixture_id = %self.fixture.id, "no subscriber yet, signal not delivered"),
        }

        let _ = self.ctx.events.log(&LiveSignalEvent {
            ts:             now_iso(),
            event:          "LIVE_SIGNAL",
            fixture_id:     self.fixture.id.clone(),
            league:         self.fixture.league.clone(),
            home:           self.fixture.home.clone(),
            away:           self.fixture.away.clone(),
            favorite:       self.fixture.favorite.to_string(),
            score:          result.score_at_signal.clone(),
            last_home_odds: result.last_home_odds,
            last_away_odds: result.last_away_odds,
        });

        self.result = Some(result);
    }

    async fn finalize(&mut self, winner: Side) {
        let Some(result) = self.result.as_mut() else {
            return;
        };
        result.set_two_winner = Some(winner);
        result.final_score = self.last_snapshot.as_ref().map(|s| s.score.clone());

        info!(
            fixture_id = %self.fixture.id,
            favorite_won = winner == self.fixture.favorite,
            "set 2 won by {winner}"
        );

        if let Err(e) = self.ctx.store.update_live_result(result).await {
            warn!(fixture_id = %self.fixture.id, "{}", MonitorError::from(e));
        }
    }

    fn finish(mut self, exit: Exit) -> TaskReport {
        self.phase = exit.phase;
        let last_score = self.last_snapshot.take().map(|s| s.score);

        match exit.phase {
            TaskPhase::Failed => error!(fixture_id = %self.fixture.id, polls = self.polls, "task failed: {}", exit.reason),
            _ => info!(fixture_id = %self.fixture.id, phase = %exit.phase, polls = self.polls, "task finished: {}", exit.reason),
        }

        let _ = self.ctx.events.log(&TaskFinishedEvent {
            ts:         now_iso(),
            event:      "TASK_FINISHED",
            fixture_id: self.fixture.id.clone(),
            phase:      exit.phase.to_string(),
            reason:     exit.reason.to_string(),
            polls:      self.polls,
            errors:     self.errors,
            last_score: last_score.clone(),
        });

        TaskReport {
            fixture_id: self.fixture.id,
            phase:      exit.phase,
            reason:     exit.reason,
            polls:      self.polls,
            errors:     self.errors,
            last_score,
            result:     self.result,
        }
    }
}
