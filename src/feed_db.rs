//! SQLite persistence. One writer thread owns the connection; everything else
//! talks to it through an mpsc channel. Reads carry a oneshot reply.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use live_monitor::{Fixture, LiveResult, ResultStore, Side, StoreError};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::statistics::StatRecord;

const DAY_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: String,
}

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

#[derive(Debug)]
pub enum DbMsg {
    InsertFixture(Fixture),
    InsertLiveResult(LiveResult),
    UpdateLiveResult(LiveResult),
    SaveStatistics(Vec<StatRecord>),
    ResultsBetween { from: NaiveDate, to: NaiveDate, reply: Reply<Vec<LiveResult>> },
    FixturesOn { day: NaiveDate, reply: Reply<Vec<Fixture>> },
    StatisticsBetween { from: NaiveDate, to: NaiveDate, reply: Reply<Vec<StatRecord>> },
}

pub fn spawn_db_writer(cfg: DbConfig) -> mpsc::Sender<DbMsg> {
    let (tx, mut rx) = mpsc::channel::<DbMsg>(10_000);

    std::thread::spawn(move || {
        let result: Result<()> = (|| {
            let db_path = Path::new(&cfg.path);
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).ok();
            }

            let conn = Connection::open(db_path).context("open sqlite db")?;
            conn.pragma_update(None, "journal_mode", "WAL").ok();
            conn.pragma_update(None, "synchronous", "NORMAL").ok();

            init_schema(&conn)?;

            while let Some(msg) = rx.blocking_recv() {
                if let Err(e) = apply_msg(&conn, msg) {
                    // a failed write must not stop the monitor
                    warn!("[results-db] write failed: {e:#}");
                }
            }

            Ok(())
        })();

        if let Err(e) = result {
            error!("[results-db] fatal: {e:#}");
        }
    });

    tx
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS fixtures (
            fixture_id TEXT PRIMARY KEY,
            starts_at TEXT NOT NULL,
            start_day TEXT NOT NULL,
            league TEXT NOT NULL,
            home TEXT NOT NULL,
            away TEXT NOT NULL,
            home_odds REAL NOT NULL,
            away_odds REAL NOT NULL,
            favorite TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_fixtures_day ON fixtures(start_day);

        CREATE TABLE IF NOT EXISTS live_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fixture_id TEXT NOT NULL UNIQUE,
            favorite TEXT NOT NULL,
            last_home_odds REAL,
            last_away_odds REAL,
            score_at_signal TEXT NOT NULL,
            set_two_winner TEXT,
            final_score TEXT,
            created_at TEXT NOT NULL,
            result_day TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_live_results_day ON live_results(result_day);

        CREATE TABLE IF NOT EXISTS daily_statistics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fixture_id TEXT NOT NULL UNIQUE,
            stat_day TEXT NOT NULL,
            favorite TEXT NOT NULL,
            favorite_odds REAL,
            favorite_won INTEGER,
            score TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_stats_day ON daily_statistics(stat_day);
        "#,
    ).context("init schema")?;

    Ok(())
}

fn day(d: NaiveDate) -> String {
    d.format(DAY_FMT).to_string()
}

fn apply_msg(conn: &Connection, msg: DbMsg) -> Result<()> {
    match msg {
        DbMsg::InsertFixture(f) => {
            conn.execute(
                r#"
                INSERT OR IGNORE INTO fixtures(fixture_id, starts_at, start_day, league, home, away, home_odds, away_odds, favorite, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    f.id,
                    f.starts_at.to_rfc3339(),
                    day(f.starts_at.date_naive()),
                    f.league,
                    f.home,
                    f.away,
                    f.home_odds,
                    f.away_odds,
                    f.favorite.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            ).context("insert fixture")?;
        }
        DbMsg::InsertLiveResult(r) => {
            conn.execute(
                r#"
                INSERT OR IGNORE INTO live_results(fixture_id, favorite, last_home_odds, last_away_odds, score_at_signal, set_two_winner, final_score, created_at, result_day)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    r.fixture_id,
                    r.favorite.as_str(),
                    r.last_home_odds,
                    r.last_away_odds,
                    r.score_at_signal,
                    r.set_two_winner.map(|s| s.as_str()),
                    r.final_score,
                    r.created_at.to_rfc3339(),
                    day(r.created_at.date_naive()),
                ],
            ).context("insert live result")?;
        }
        DbMsg::UpdateLiveResult(r) => {
            let changed = conn.execute(
                "UPDATE live_results SET set_two_winner = ?2, final_score = ?3 WHERE fixture_id = ?1",
                params![r.fixture_id, r.set_two_winner.map(|s| s.as_str()), r.final_score],
            ).context("update live result")?;
            if changed == 0 {
                warn!(fixture_id = %r.fixture_id, "[results-db] update matched no live result");
            }
        }
        DbMsg::SaveStatistics(rows) => {
            let mut stmt = conn.prepare_cached(
                r#"
                INSERT OR IGNORE INTO daily_statistics(fixture_id, stat_day, favorite, favorite_odds, favorite_won, score)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for r in rows {
                stmt.execute(params![
                    r.fixture_id,
                    day(r.day),
                    r.favorite.as_str(),
                    r.favorite_odds,
                    r.favorite_won,
                    r.score,
                ]).context("insert statistics row")?;
            }
        }
        DbMsg::ResultsBetween { from, to, reply } => {
            let _ = reply.send(query_results(conn, from, to).map_err(query_error));
        }
        DbMsg::FixturesOn { day: d, reply } => {
            let _ = reply.send(query_fixtures(conn, d).map_err(query_error));
        }
        DbMsg::StatisticsBetween { from, to, reply } => {
            let _ = reply.send(query_statistics(conn, from, to).map_err(query_error));
        }
    }

    Ok(())
}

fn query_error(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn side_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Side> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_side_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Side>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => side_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<FixedOffset>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn day_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DAY_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn query_results(conn: &Connection, from: NaiveDate, to: NaiveDate) -> rusqlite::Result<Vec<LiveResult>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT fixture_id, favorite, last_home_odds, last_away_odds, score_at_signal, set_two_winner, final_score, created_at
        FROM live_results
        WHERE result_day BETWEEN ?1 AND ?2
        ORDER BY created_at
        "#,
    )?;
    let rows = stmt.query_map(params![day(from), day(to)], |row| {
        Ok(LiveResult {
            fixture_id:      row.get(0)?,
            favorite:        side_at(row, 1)?,
            last_home_odds:  row.get(2)?,
            last_away_odds:  row.get(3)?,
            score_at_signal: row.get(4)?,
            set_two_winner:  opt_side_at(row, 5)?,
            final_score:     row.get(6)?,
            created_at:      time_at(row, 7)?,
        })
    })?;
    rows.collect()
}

fn query_fixtures(conn: &Connection, d: NaiveDate) -> rusqlite::Result<Vec<Fixture>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT fixture_id, starts_at, league, home, away, home_odds, away_odds, favorite
        FROM fixtures
        WHERE start_day = ?1
        ORDER BY starts_at
        "#,
    )?;
    let rows = stmt.query_map(params![day(d)], |row| {
        Ok(Fixture {
            id:        row.get(0)?,
            starts_at: time_at(row, 1)?,
            league:    row.get(2)?,
            home:      row.get(3)?,
            away:      row.get(4)?,
            home_odds: row.get(5)?,
            away_odds: row.get(6)?,
            favorite:  side_at(row, 7)?,
        })
    })?;
    rows.collect()
}

fn query_statistics(conn: &Connection, from: NaiveDate, to: NaiveDate) -> rusqlite::Result<Vec<StatRecord>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT fixture_id, stat_day, favorite, favorite_odds, favorite_won, score
        FROM daily_statistics
        WHERE stat_day BETWEEN ?1 AND ?2
        ORDER BY stat_day, id
        "#,
    )?;
    let rows = stmt.query_map(params![day(from), day(to)], |row| {
        Ok(StatRecord {
            fixture_id:    row.get(0)?,
            day:           day_at(row, 1)?,
            favorite:      side_at(row, 2)?,
            favorite_odds: row.get(3)?,
            favorite_won:  row.get(4)?,
            score:         row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Store handle ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::Sender<DbMsg>,
}

impl SqliteStore {
    pub fn open(cfg: DbConfig) -> Self {
        Self { tx: spawn_db_writer(cfg) }
    }

    async fn send(&self, msg: DbMsg) -> Result<(), StoreError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| StoreError::Unavailable("writer thread stopped".into()))
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> DbMsg) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await
            .map_err(|_| StoreError::Unavailable("writer dropped the request".into()))?
    }

    /// Live results whose signal fell on a local day in `from..=to`.
    pub async fn results_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<LiveResult>, StoreError> {
        self.request(|reply| DbMsg::ResultsBetween { from, to, reply }).await
    }

    pub async fn fixtures_on(&self, day: NaiveDate) -> Result<Vec<Fixture>, StoreError> {
        self.request(|reply| DbMsg::FixturesOn { day, reply }).await
    }

    pub async fn save_statistics(&self, rows: Vec<StatRecord>) -> Result<(), StoreError> {
        self.send(DbMsg::SaveStatistics(rows)).await
    }

    pub async fn statistics_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<StatRecord>, StoreError> {
        self.request(|reply| DbMsg::StatisticsBetween { from, to, reply }).await
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn insert_fixture(&self, fixture: &Fixture) -> Result<(), StoreError> {
        self.send(DbMsg::InsertFixture(fixture.clone())).await
    }

    async fn insert_live_result(&self, result: &LiveResult) -> Result<(), StoreError> {
        self.send(DbMsg::InsertLiveResult(result.clone())).await
    }

    async fn update_live_result(&self, result: &LiveResult) -> Result<(), StoreError> {
        self.send(DbMsg::UpdateLiveResult(result.clone())).await
    }
}
