use std::time::Duration;

use chrono::{FixedOffset, Offset, TimeDelta, Utc};

use crate::classifier::LeagueFilter;

pub const DEFAULT_FAVORITE_MAX_ODDS: f64      = 1.31;
pub const DEFAULT_LIVE_MIN_FAVORITE_ODDS: f64 = 1.5;
pub const DEFAULT_UTC_OFFSET_HOURS: i32       = 3;

/// Thresholds and cadences shared by the scheduler and every task.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub favorite_max_odds:      f64,        // pre-match ceiling, inclusive
    pub live_min_favorite_odds: f64,        // favorite live odds must be strictly above
    pub poll_interval:          Duration,
    pub error_backoff:          Duration,
    pub max_poll_errors:        u32,
    pub task_lifetime:          Duration,   // one deadline for both phases
    pub scheduler_interval:     Duration,
    pub late_start_grace:       TimeDelta,
    pub lookahead:              TimeDelta,
    pub utc_offset:             FixedOffset,
    pub league_filter:          LeagueFilter,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            favorite_max_odds:      DEFAULT_FAVORITE_MAX_ODDS,
            live_min_favorite_odds: DEFAULT_LIVE_MIN_FAVORITE_ODDS,
            poll_interval:          Duration::from_secs(5),
            error_backoff:          Duration::from_secs(2),
            max_poll_errors:        100,
            task_lifetime:          Duration::from_secs(2 * 60 * 60),
            scheduler_interval:     Duration::from_secs(60),
            late_start_grace:       TimeDelta::minutes(30),
            lookahead:              TimeDelta::hours(24),
            utc_offset:             utc_offset_hours(DEFAULT_UTC_OFFSET_HOURS),
            league_filter:          LeagueFilter::allow_all(),
        }
    }
}

/// Fixed offset `hours` east of UTC. Out-of-range values fall back to UTC.
pub fn utc_offset_hours(hours: i32) -> FixedOffset {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_outside_a_day_fall_back_to_utc() {
        assert_eq!(utc_offset_hours(3).local_minus_utc(), 3 * 3600);
        assert_eq!(utc_offset_hours(-5).local_minus_utc(), -5 * 3600);
        assert_eq!(utc_offset_hours(30).local_minus_utc(), 0);
    }
}
