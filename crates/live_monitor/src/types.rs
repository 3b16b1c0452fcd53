use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use set_score::Side;

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// A fixture as listed by the feed, before pre-match odds are known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingFixture {
    pub id:        String,
    pub starts_at: DateTime<FixedOffset>,
    pub league:    String,
    pub home:      String,
    pub away:      String,
}

/// Pre-match decimal odds for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrematchOdds {
    pub home: f64,
    pub away: f64,
}

/// A classified fixture with a clear favorite. Never changes once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fixture {
    pub id:        String,
    pub starts_at: DateTime<FixedOffset>,
    pub league:    String,
    pub home:      String,
    pub away:      String,
    pub home_odds: f64,
    pub away_odds: f64,
    pub favorite:  Side,
}

impl Fixture {
    pub fn favorite_odds(&self) -> f64 {
        match self.favorite {
            Side::Home => self.home_odds,
            Side::Away => self.away_odds,
        }
    }

    pub fn favorite_name(&self) -> &str {
        match self.favorite {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }
}

// ── Live data ────────────────────────────────────────────────────────────────

/// One poll of the live feed. Odds are `None` while the book is suspended.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot {
    pub fixture_id: String,
    pub score:      String,
    pub home_odds:  Option<f64>,
    pub away_odds:  Option<f64>,
}

impl LiveSnapshot {
    pub fn odds_for(&self, side: Side) -> Option<f64> {
        match side {
            Side::Home => self.home_odds,
            Side::Away => self.away_odds,
        }
    }
}

/// Record of a signal, completed once set 2 is decided.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveResult {
    pub fixture_id:      String,
    pub favorite:        Side,
    pub last_home_odds:  Option<f64>,
    pub last_away_odds:  Option<f64>,
    pub score_at_signal: String,
    pub set_two_winner:  Option<Side>,
    pub final_score:     Option<String>,
    pub created_at:      DateTime<FixedOffset>,
}

impl LiveResult {
    /// `None` until set 2 has a winner.
    pub fn favorite_won_set_two(&self) -> Option<bool> {
        self.set_two_winner.map(|w| w == self.favorite)
    }

    pub fn favorite_last_odds(&self) -> Option<f64> {
        match self.favorite {
            Side::Home => self.last_home_odds,
            Side::Away => self.last_away_odds,
        }
    }
}

/// Chat that receives signals. Resolved at subscription time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Recipient(pub i64);

impl Recipient {
    pub fn chat_id(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(favorite: Side, winner: Option<Side>) -> LiveResult {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        LiveResult {
            fixture_id: "1".into(),
            favorite,
            last_home_odds: Some(3.1),
            last_away_odds: Some(1.7),
            score_at_signal: "18-25,2-1".into(),
            set_two_winner: winner,
            final_score: None,
            created_at: tz.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn favorite_outcome_follows_set_two() {
        assert_eq!(result(Side::Away, None).favorite_won_set_two(), None);
        assert_eq!(result(Side::Away, Some(Side::Away)).favorite_won_set_two(), Some(true));
        assert_eq!(result(Side::Home, Some(Side::Away)).favorite_won_set_two(), Some(false));
    }

    #[test]
    fn favorite_odds_pick_the_right_side() {
        assert_eq!(result(Side::Away, None).favorite_last_odds(), Some(1.7));
        assert_eq!(result(Side::Home, None).favorite_last_odds(), Some(3.1));
    }
}
