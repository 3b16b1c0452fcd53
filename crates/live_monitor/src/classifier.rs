//! Pre-match favorite classification and league filtering.

use crate::types::{Fixture, PrematchOdds, UpcomingFixture};
use set_score::Side;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// The side with the lower odds sits at or below the ceiling.
    Favorite(Side),
    /// Both sides priced above the ceiling.
    NoClearFavorite,
    /// Non-finite or non-positive odds on either side.
    InvalidOdds,
}

/// Picks the favorite from pre-match odds. Level odds go to the home side.
pub fn classify(home: f64, away: f64, ceiling: f64) -> Classification {
    let valid = |o: f64| o.is_finite() && o > 0.0;
    if !valid(home) || !valid(away) {
        return Classification::InvalidOdds;
    }

    let (side, odds) = if home <= away { (Side::Home, home) } else { (Side::Away, away) };
    if odds <= ceiling {
        Classification::Favorite(side)
    } else {
        Classification::NoClearFavorite
    }
}

/// Attaches odds and a favorite to an upcoming fixture, `None` when it does not qualify.
pub fn qualify(upcoming: UpcomingFixture, odds: PrematchOdds, ceiling: f64) -> Option<Fixture> {
    match classify(odds.home, odds.away, ceiling) {
        Classification::Favorite(favorite) => Some(Fixture {
            id:        upcoming.id,
            starts_at: upcoming.starts_at,
            league:    upcoming.league,
            home:      upcoming.home,
            away:      upcoming.away,
            home_odds: odds.home,
            away_odds: odds.away,
            favorite,
        }),
        Classification::NoClearFavorite | Classification::InvalidOdds => None,
    }
}

// ── League filter ────────────────────────────────────────────────────────────

const WOMEN_MARKER: &str = "Women";

/// Substring allow-list over league names.
///
/// A league passes when it contains one of the allowed keys, unless that key is
/// listed in `women_excluded` and the league name carries `"Women"`. An empty
/// allow-list lets every league through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeagueFilter {
    allow:          Vec<String>,
    women_excluded: Vec<String>,
}

impl LeagueFilter {
    pub fn new(allow: Vec<String>, women_excluded: Vec<String>) -> Self {
        let clean = |v: Vec<String>| -> Vec<String> {
            v.into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self { allow: clean(allow), women_excluded: clean(women_excluded) }
    }

    /// Builds a filter from comma-separated lists.
    pub fn from_csv(allow: &str, women_excluded: &str) -> Self {
        let split = |s: &str| s.split(',').map(str::to_string).collect();
        Self::new(split(allow), split(women_excluded))
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.allow.is_empty()
    }

    pub fn allows(&self, league: &str) -> bool {
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|key| {
            league.contains(key.as_str())
                && !(league.contains(WOMEN_MARKER) && self.women_excluded.contains(key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn lower_odds_side_is_favorite() {
        assert_eq!(classify(1.233, 3.0, 1.31), Classification::Favorite(Side::Home));
        assert_eq!(classify(1.3, 1.233, 1.31), Classification::Favorite(Side::Away));
        assert_eq!(classify(1.20, 4.5, 1.20), Classification::Favorite(Side::Home));
    }

    #[test]
    fn ceiling_is_inclusive() {
        assert_eq!(classify(7.0, 1.31, 1.31), Classification::Favorite(Side::Away));
        assert_eq!(classify(7.0, 1.33, 1.31), Classification::NoClearFavorite);
    }

    #[test]
    fn no_favorite_above_ceiling() {
        assert_eq!(classify(1.40, 1.40, 1.31), Classification::NoClearFavorite);
        assert_eq!(classify(1.85, 1.95, 1.31), Classification::NoClearFavorite);
    }

    #[test]
    fn level_odds_favor_home() {
        assert_eq!(classify(1.25, 1.25, 1.31), Classification::Favorite(Side::Home));
    }

    #[test]
    fn broken_odds_never_qualify() {
        assert_eq!(classify(f64::NAN, 1.1, 1.31), Classification::InvalidOdds);
        assert_eq!(classify(1.1, f64::INFINITY, 1.31), Classification::InvalidOdds);
        assert_eq!(classify(0.0, 1.1, 1.31), Classification::InvalidOdds);
        assert_eq!(classify(-1.0, 1.1, 1.31), Classification::InvalidOdds);
    }

    #[test]
    fn qualify_carries_fixture_fields() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let upcoming = UpcomingFixture {
            id:        "6060".into(),
            starts_at: tz.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap(),
            league:    "Italy Serie A1".into(),
            home:      "Trento".into(),
            away:      "Modena".into(),
        };

        let fixture = qualify(upcoming.clone(), PrematchOdds { home: 2.9, away: 1.28 }, 1.31).unwrap();
        assert_eq!(fixture.favorite, Side::Away);
        assert_eq!(fixture.favorite_name(), "Modena");
        assert_eq!(fixture.favorite_odds(), 1.28);
        assert_eq!(fixture.starts_at, upcoming.starts_at);

        assert!(qualify(upcoming, PrematchOdds { home: 1.8, away: 1.9 }, 1.31).is_none());
    }

    #[test]
    fn league_filter_matches_countries() {
        let filter = LeagueFilter::from_csv(
            "Italy,Poland,Russia,Germany,Greece,Portugal,Romania,Serbia,Turkey,Ukraine,France,Croatia,Sweden,Spain,Finland",
            "Serbia,Ukraine,Spain,Finland",
        );

        assert!(filter.allows("Match Italy Men"));
        assert!(filter.allows("League Russia"));
        assert!(!filter.allows("League Kazakhstan"));
        assert!(!filter.allows("League Ukraine Women"));
        assert!(filter.allows("League Ukraine Men"));
        assert!(!filter.allows("Spain Women"));
        assert!(filter.allows("Spain"));
        // women's leagues pass for countries outside the exclusion list
        assert!(filter.allows("Russia Cup Women"));
        assert!(filter.allows("Turkey Efeler League Women"));
    }

    #[test]
    fn empty_filter_allows_everything() {
        let filter = LeagueFilter::from_csv("", " , ");
        assert!(filter.is_open());
        assert!(filter.allows("League Kazakhstan"));
        assert!(LeagueFilter::allow_all().allows("anything"));
    }
}
