/// volley-live: Logger
/// JSONL audit stream, one file per day

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub struct EventLogger {
    log_dir: PathBuf,
}

impl EventLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let dir = log_dir.into();
        fs::create_dir_all(&dir).ok();
        Self { log_dir: dir }
    }

    pub fn log<T: Serialize>(&self, event: &T) -> Result<()> {
        let date  = Utc::now().format("%Y-%m-%d").to_string();
        let path  = self.log_dir.join(format!("{date}.jsonl"));
        let line  = serde_json::to_string(event)?;
        let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

// ── Event types ────────────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct FixtureQualifiedEvent {
    pub ts:          String,
    pub event:       &'static str,   // "FIXTURE_QUALIFIED"
    pub fixture_id:  String,
    pub league:      String,
    pub home:        String,
    pub away:        String,
    pub starts_at:   String,
    pub home_odds:   f64,
    pub away_odds:   f64,
    pub favorite:    String,         // "home" | "away"
}

#[derive(Serialize, Debug)]
pub struct TaskStartedEvent {
    pub ts:          String,
    pub event:       &'static str,   // "TASK_STARTED"
    pub fixture_id:  String,
    pub starts_at:   String,
    pub favorite:    String,
}

#[derive(Serialize, Debug)]
pub struct LiveSignalEvent {
    pub ts:             String,
    pub event:          &'static str,   // "LIVE_SIGNAL"
    pub fixture_id:     String,
    pub league:         String,
    pub home:           String,
    pub away:           String,
    pub favorite:       String,
    pub score:          String,
    pub last_home_odds: Option<f64>,
    pub last_away_odds: Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct TaskFinishedEvent {
    pub ts:          String,
    pub event:       &'static str,   // "TASK_FINISHED"
    pub fixture_id:  String,
    pub phase:       String,         // terminal phase
    pub reason:      String,
    pub polls:       u32,
    pub errors:      u32,
    pub last_score:  Option<String>,
}

#[derive(Serialize, Debug)]
pub struct SchedulerCycleEvent {
    pub ts:              String,
    pub event:           &'static str,   // "SCHEDULER_CYCLE"
    pub candidates:      usize,
    pub newly_seen:      usize,
    pub qualified:       usize,
    pub launched:        usize,
    pub active_tasks:    usize,
}
