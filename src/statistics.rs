//! Daily and weekly hit-rate reports over finished signals.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, TimeDelta, Utc, Weekday};
use live_monitor::{LiveResult, Notifier, Recipient, Side};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::feed_db::SqliteStore;

/// One signal as archived in `daily_statistics`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub fixture_id:    String,
    pub day:           NaiveDate,
    pub favorite:      Side,
    pub favorite_odds: Option<f64>,   // favorite's live odds at signal time
    pub favorite_won:  Option<bool>,  // None when set 2 was never decided
    pub score:         Option<String>,
}

impl StatRecord {
    pub fn from_result(r: &LiveResult) -> Self {
        Self {
            fixture_id:    r.fixture_id.clone(),
            day:           r.created_at.date_naive(),
            favorite:      r.favorite,
            favorite_odds: r.favorite_last_odds(),
            favorite_won:  r.favorite_won_set_two(),
            score:         r.final_score.clone().or_else(|| Some(r.score_at_signal.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub won:       usize,
    pub lost:      usize,
    pub undecided: usize,
    /// Mean favorite odds over won signals, to the cent.
    pub average_won_odds: Option<f64>,
}

pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn summarize(records: &[StatRecord]) -> Summary {
    let mut summary = Summary::default();
    let mut won_odds = Vec::new();

    for r in records {
        match r.favorite_won {
            Some(true) => {
                summary.won += 1;
                won_odds.extend(r.favorite_odds);
            }
            Some(false) => summary.lost += 1,
            None => summary.undecided += 1,
        }
    }

    if !won_odds.is_empty() {
        let mean = won_odds.iter().sum::<f64>() / won_odds.len() as f64;
        summary.average_won_odds = Some(round_cents(mean));
    }
    summary
}

pub fn report_message(title: &str, s: &Summary) -> String {
    let avg = s.average_won_odds.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    format!(
        "📊 {title}\n  win: {}\n  lose: {}\n  undecided: {}\n  average odds: {avg}",
        s.won, s.lost, s.undecided
    )
}

/// Next `hour:00` local time strictly after `now`.
pub fn next_run_at(now: DateTime<FixedOffset>, hour: u32) -> DateTime<FixedOffset> {
    let at = |d: NaiveDate| {
        d.and_hms_opt(hour.min(23), 0, 0)
            .and_then(|t| t.and_local_timezone(*now.offset()).single())
    };
    match at(now.date_naive()) {
        Some(today) if today > now => today,
        _ => now
            .date_naive()
            .succ_opt()
            .and_then(at)
            .unwrap_or(now + TimeDelta::hours(24)),
    }
}

// ── Jobs ─────────────────────────────────────────────────────────────────────

async fn deliver(notifier: &dyn Notifier, recipient: Option<Recipient>, text: &str) {
    match recipient {
        Some(to) => {
            if let Err(e) = notifier.send(to, text).await {
                warn!("statistics not delivered: {e}");
            }
        }
        None => info!("no subscriber, statistics logged only:\n{text}"),
    }
}

/// Archives yesterday's signals and reports them. On Mondays also reports the past week.
pub async fn run_daily_report(
    store: &SqliteStore,
    notifier: &dyn Notifier,
    recipient: Option<Recipient>,
    today: NaiveDate,
) -> Result<Summary> {
    let yesterday = today.pred_opt().context("no day before today")?;

    let results = store
        .results_between(yesterday, yesterday)
        .await
        .context("read yesterday's live results")?;
    let records: Vec<StatRecord> = results.iter().map(StatRecord::from_result).collect();
    store
        .save_statistics(records.clone())
        .await
        .context("archive statistics")?;

    let daily = summarize(&records);
    info!(day = %yesterday, won = daily.won, lost = daily.lost, "daily statistics");
    deliver(notifier, recipient, &report_message(&format!("Results for {yesterday}"), &daily)).await;

    if today.weekday() == Weekday::Mon {
        let from = today.checked_sub_days(Days::new(7)).context("week start out of range")?;
        let week = store
            .statistics_between(from, yesterday)
            .await
            .context("read last week's statistics")?;
        let weekly = summarize(&week);
        info!(from = %from, to = %yesterday, won = weekly.won, lost = weekly.lost, "weekly statistics");
        deliver(notifier, recipient, &report_message(&format!("Results for {from} to {yesterday}"), &weekly)).await;
    }

    Ok(daily)
}

/// Runs the daily report at `hour` local time until `stop` fires.
pub async fn run_statistics_job(
    store: SqliteStore,
    notifier: Arc<dyn Notifier>,
    recipient: watch::Receiver<Option<Recipient>>,
    utc_offset: FixedOffset,
    hour: u32,
    stop: CancellationToken,
) {
    loop {
        let now = Utc::now().with_timezone(&utc_offset);
        let next = next_run_at(now, hour);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next, "statistics scheduled");

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let today = Utc::now().with_timezone(&utc_offset).date_naive();
        let to = *recipient.borrow();
        if let Err(e) = run_daily_report(&store, notifier.as_ref(), to, today).await {
            warn!("statistics job failed: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed_db::DbConfig;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use live_monitor::{NotifyError, ResultStore};
    use std::sync::Mutex;

    fn msk() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn record(won: Option<bool>, odds: Option<f64>) -> StatRecord {
        StatRecord {
            fixture_id:    "1".into(),
            day:           NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            favorite:      Side::Away,
            favorite_odds: odds,
            favorite_won:  won,
            score:         None,
        }
    }

    #[test]
    fn average_over_won_signals() {
        let records = [
            record(Some(true), Some(8.0)),
            record(Some(true), Some(7.0)),
            record(Some(true), Some(7.0)),
            record(Some(false), Some(1.9)),
            record(None, Some(3.0)),
        ];
        let s = summarize(&records);
        assert_eq!(s.won, 3);
        assert_eq!(s.lost, 1);
        assert_eq!(s.undecided, 1);
        assert_eq!(s.average_won_odds, Some(7.33));
    }

    #[test]
    fn no_wins_no_average() {
        let s = summarize(&[record(Some(false), Some(2.0))]);
        assert_eq!(s.average_won_odds, None);
        assert!(report_message("x", &s).contains("average odds: -"));
    }

    #[test]
    fn record_from_result() {
        let r = LiveResult {
            fixture_id:      "5".into(),
            favorite:        Side::Home,
            last_home_odds:  Some(2.05),
            last_away_odds:  Some(1.7),
            score_at_signal: "22-25,1-0".into(),
            set_two_winner:  Some(Side::Home),
            final_score:     Some("22-25,25-17,0-0".into()),
            created_at:      msk().with_ymd_and_hms(2024, 5, 2, 23, 50, 0).unwrap(),
        };
        let rec = StatRecord::from_result(&r);
        assert_eq!(rec.day, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert_eq!(rec.favorite_odds, Some(2.05));
        assert_eq!(rec.favorite_won, Some(true));
        assert_eq!(rec.score.as_deref(), Some("22-25,25-17,0-0"));
    }

    #[test]
    fn next_run_rolls_to_tomorrow() {
        let before = msk().with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap();
        assert_eq!(next_run_at(before, 9), msk().with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap());

        let after = msk().with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
        assert_eq!(next_run_at(after, 9), msk().with_ymd_and_hms(2024, 5, 3, 9, 0, 0).unwrap());
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for Inbox {
        async fn send(&self, _to: Recipient, text: &str) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn signal(id: &str, day: u32, winner: Option<Side>, away_odds: f64) -> LiveResult {
        LiveResult {
            fixture_id:      id.into(),
            favorite:        Side::Away,
            last_home_odds:  Some(1.4),
            last_away_odds:  Some(away_odds),
            score_at_signal: "25-20,1-1".into(),
            set_two_winner:  winner,
            final_score:     None,
            created_at:      msk().with_ymd_and_hms(2024, 5, day, 18, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn monday_sends_daily_and_weekly() {
        let store = SqliteStore::open(DbConfig { path: ":memory:".into() });
        // 2024-05-05 is a Sunday
        store.insert_live_result(&signal("a", 5, Some(Side::Away), 8.0)).await.unwrap();
        store.insert_live_result(&signal("b", 5, Some(Side::Away), 7.0)).await.unwrap();
        store.insert_live_result(&signal("c", 5, Some(Side::Away), 7.0)).await.unwrap();
        store.insert_live_result(&signal("d", 5, Some(Side::Home), 2.0)).await.unwrap();
        store.insert_live_result(&signal("e", 4, Some(Side::Home), 2.0)).await.unwrap();

        let inbox = Inbox::default();
        let monday = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let daily = run_daily_report(&store, &inbox, Some(Recipient(1)), monday).await.unwrap();

        assert_eq!(daily.won, 3);
        assert_eq!(daily.lost, 1);
        assert_eq!(daily.average_won_odds, Some(7.33));

        let sent = inbox.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("win: 3"));
        assert!(sent[0].contains("7.33"));
        // only Sunday was archived so far
        assert!(sent[1].contains("win: 3"));
        assert!(sent[1].contains("lose: 1"));
    }

    #[tokio::test]
    async fn weekday_sends_daily_only() {
        let store = SqliteStore::open(DbConfig { path: ":memory:".into() });
        let inbox = Inbox::default();
        let wednesday = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();

        let daily = run_daily_report(&store, &inbox, Some(Recipient(1)), wednesday).await.unwrap();
        assert_eq!(daily, Summary::default());
        assert_eq!(inbox.0.lock().unwrap().len(), 1);
    }
}
