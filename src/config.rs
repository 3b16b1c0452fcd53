//! Env / `.env` configuration for the live-observer binary.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use bet_api::BetApiConfig;
use chrono::TimeDelta;
use live_monitor::{utc_offset_hours, LeagueFilter, MonitorConfig};

pub const DEFAULT_HTTP_BIND: &str   = "127.0.0.1:8090";
pub const DEFAULT_DB_PATH: &str     = "data/volley_results.db";
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_STATS_HOUR: u32   = 9;

/// League countries followed when `LEAGUE_ALLOW` is not set.
pub const DEFAULT_LEAGUES: &str =
    "Italy,Poland,Russia,Germany,Greece,Portugal,Romania,Serbia,Turkey,Ukraine,France,Croatia,Sweden,Spain,Finland";
/// Countries whose women's leagues are skipped.
pub const DEFAULT_WOMEN_EXCLUDED: &str = "Serbia,Ukraine,Spain,Finland";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bet_api:          BetApiConfig,
    pub telegram_token:   Option<String>,
    pub telegram_chat_id: Option<i64>,   // fixed recipient until someone sends /start
    pub monitor:          MonitorConfig,
    pub db_path:          PathBuf,
    pub http_bind:        SocketAddr,
    pub api_version:      String,
    pub stats_hour:       u32,
    pub log_dir:          PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<f64>().ok());
        let secs = |key: &str, default: u64| {
            Duration::from_secs(var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default))
        };
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = non_empty("BET_API_TOKEN").context("BET_API_TOKEN not set")?;
        let mut bet_api = BetApiConfig::new(token);
        if let Some(url) = non_empty("BET_API_UPCOMING_URL") {
            bet_api.upcoming_url = url;
        }
        if let Some(url) = non_empty("BET_API_ODDS_URL") {
            bet_api.odds_url = url;
        }
        bet_api.requests_per_sec = parse_or(&var, "FEED_REQUESTS_PER_SEC", bet_api.requests_per_sec).max(1);

        let defaults = MonitorConfig::default();
        let league_filter = LeagueFilter::from_csv(
            &non_empty("LEAGUE_ALLOW").unwrap_or_else(|| DEFAULT_LEAGUES.to_string()),
            &non_empty("WOMEN_EXCLUDED_COUNTRIES").unwrap_or_else(|| DEFAULT_WOMEN_EXCLUDED.to_string()),
        );
        let monitor = MonitorConfig {
            favorite_max_odds:      parsed("FAVORITE_MAX_ODDS").unwrap_or(defaults.favorite_max_odds),
            live_min_favorite_odds: parsed("LIVE_MIN_FAVORITE_ODDS").unwrap_or(defaults.live_min_favorite_odds),
            poll_interval:          secs("POLL_INTERVAL_SECS", defaults.poll_interval.as_secs()),
            error_backoff:          secs("ERROR_BACKOFF_SECS", defaults.error_backoff.as_secs()),
            max_poll_errors:        parse_or(&var, "MAX_POLL_ERRORS", defaults.max_poll_errors),
            task_lifetime:          secs("TASK_LIFETIME_MINS", defaults.task_lifetime.as_secs() / 60) * 60,
            scheduler_interval:     secs("SCHEDULER_INTERVAL_SECS", defaults.scheduler_interval.as_secs()).max(Duration::from_secs(1)),
            late_start_grace:       var_minutes(&var, "LATE_START_GRACE_MINS").unwrap_or(defaults.late_start_grace),
            lookahead:              var_hours(&var, "LOOKAHEAD_HOURS").unwrap_or(defaults.lookahead),
            utc_offset:             utc_offset_hours(parse_or(&var, "UTC_OFFSET_HOURS", live_monitor::config::DEFAULT_UTC_OFFSET_HOURS)),
            league_filter,
        };

        let http_bind = match non_empty("HTTP_BIND") {
            Some(raw) => raw.parse().with_context(|| format!("HTTP_BIND is not an address: {raw}"))?,
            None => DEFAULT_HTTP_BIND.parse().context("default http bind")?,
        };

        Ok(Self {
            bet_api,
            telegram_token: non_empty("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: var("TELEGRAM_CHAT_ID").and_then(|v| v.trim().parse().ok()),
            monitor,
            db_path: non_empty("RESULTS_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()).into(),
            http_bind,
            api_version: non_empty("API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            stats_hour: parse_or(&var, "STATS_HOUR", DEFAULT_STATS_HOUR).min(23),
            log_dir: non_empty("LOG_DIR").unwrap_or_else(|| "logs".to_string()).into(),
        })
    }
}

fn parse_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Out-of-range spans count as unset.
fn var_minutes(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<TimeDelta> {
    var(key).and_then(|v| v.trim().parse().ok()).and_then(TimeDelta::try_minutes)
}

fn var_hours(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<TimeDelta> {
    var(key).and_then(|v| v.trim().parse().ok()).and_then(TimeDelta::try_hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn token_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("BET_API_TOKEN"));
        assert!(load(&[("BET_API_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("BET_API_TOKEN", "t0k")]).unwrap();
        assert_eq!(cfg.bet_api.token, "t0k");
        assert_eq!(cfg.monitor.favorite_max_odds, 1.31);
        assert_eq!(cfg.monitor.live_min_favorite_odds, 1.5);
        assert_eq!(cfg.monitor.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.monitor.task_lifetime, Duration::from_secs(2 * 60 * 60));
        assert_eq!(cfg.monitor.utc_offset.local_minus_utc(), 3 * 3600);
        assert_eq!(cfg.http_bind, "127.0.0.1:8090".parse().unwrap());
        assert_eq!(cfg.stats_hour, DEFAULT_STATS_HOUR);
        assert!(cfg.telegram_token.is_none());
        assert!(cfg.telegram_chat_id.is_none());

        assert!(cfg.monitor.league_filter.allows("Italy A1"));
        assert!(!cfg.monitor.league_filter.allows("Brazil Superliga"));
        assert!(!cfg.monitor.league_filter.allows("Serbia Superliga Women"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("BET_API_TOKEN", "t"),
            ("FAVORITE_MAX_ODDS", "1.25"),
            ("LIVE_MIN_FAVORITE_ODDS", "1.8"),
            ("POLL_INTERVAL_SECS", "3"),
            ("TASK_LIFETIME_MINS", "90"),
            ("LATE_START_GRACE_MINS", "10"),
            ("UTC_OFFSET_HOURS", "-2"),
            ("LEAGUE_ALLOW", "Brazil"),
            ("TELEGRAM_CHAT_ID", "-100123"),
            ("HTTP_BIND", "0.0.0.0:9000"),
            ("STATS_HOUR", "40"),
            ("FEED_REQUESTS_PER_SEC", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.monitor.favorite_max_odds, 1.25);
        assert_eq!(cfg.monitor.live_min_favorite_odds, 1.8);
        assert_eq!(cfg.monitor.poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.monitor.task_lifetime, Duration::from_secs(90 * 60));
        assert_eq!(cfg.monitor.late_start_grace, TimeDelta::minutes(10));
        assert_eq!(cfg.monitor.utc_offset.local_minus_utc(), -2 * 3600);
        assert!(cfg.monitor.league_filter.allows("Brazil Superliga"));
        assert_eq!(cfg.telegram_chat_id, Some(-100123));
        assert_eq!(cfg.http_bind.port(), 9000);
        assert_eq!(cfg.stats_hour, 23);
        assert_eq!(cfg.bet_api.requests_per_sec, 1);
    }

    #[test]
    fn huge_spans_fall_back_to_defaults() {
        let cfg = load(&[
            ("BET_API_TOKEN", "t"),
            ("LATE_START_GRACE_MINS", "9223372036854775807"),
            ("LOOKAHEAD_HOURS", "-9223372036854775807"),
        ])
        .unwrap();
        assert_eq!(cfg.monitor.late_start_grace, TimeDelta::minutes(30));
        assert_eq!(cfg.monitor.lookahead, TimeDelta::hours(24));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let cfg = load(&[("BET_API_TOKEN", "t"), ("MAX_POLL_ERRORS", "lots"), ("FAVORITE_MAX_ODDS", "x")]).unwrap();
        assert_eq!(cfg.monitor.max_poll_errors, 100);
        assert_eq!(cfg.monitor.favorite_max_odds, 1.31);
        assert!(load(&[("BET_API_TOKEN", "t"), ("HTTP_BIND", "nowhere")]).is_err());
    }
}
