//! Volleyball set-score parser
//!
//! The live feed reports the running score as one `"<home>-<away>"` entry per
//! set, newest last: `"25-18,17-25,3-1"`. A set counts as finished once the
//! feed has opened the next entry. Point totals are never used to decide
//! completion, the feed is trusted to append an entry only when a set ends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Sides ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown side {0:?}")]
pub struct UnknownSide(pub String);

impl FromStr for Side {
    type Err = UnknownSide;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(Side::Home),
            "away" => Ok(Side::Away),
            other => Err(UnknownSide(other.to_string())),
        }
    }
}

/// Winner of a single set as seen at poll time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SetWinner {
    Home,
    Away,
    /// Only ever reported for the set still being played.
    Undecided,
}

impl From<Side> for SetWinner {
    fn from(side: Side) -> Self {
        match side {
            Side::Home => SetWinner::Home,
            Side::Away => SetWinner::Away,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("fixture {fixture_id}: set {set} entry {entry:?} has no '-' separator")]
    MissingSeparator {
        fixture_id: String,
        set: usize,
        entry: String,
    },

    #[error("fixture {fixture_id}: set {set} entry {entry:?} has non-numeric points")]
    InvalidPoints {
        fixture_id: String,
        set: usize,
        entry: String,
    },

    #[error("fixture {fixture_id}: finished set {set} is tied {home}-{away}")]
    TiedSet {
        fixture_id: String,
        set: usize,
        home: u32,
        away: u32,
    },
}

impl ParseError {
    pub fn fixture_id(&self) -> &str {
        match self {
            ParseError::MissingSeparator { fixture_id, .. }
            | ParseError::InvalidPoints { fixture_id, .. }
            | ParseError::TiedSet { fixture_id, .. } => fixture_id,
        }
    }

    /// 1-based set number the error points at.
    pub fn set(&self) -> usize {
        match self {
            ParseError::MissingSeparator { set, .. }
            | ParseError::InvalidPoints { set, .. }
            | ParseError::TiedSet { set, .. } => *set,
        }
    }
}

// ── Set results ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SetResult {
    /// 1-based position in the match.
    pub number: usize,
    pub home:   u32,
    pub away:   u32,
    /// False only for the last entry, which is still being played.
    pub finished: bool,
}

impl SetResult {
    /// Side currently ahead on points, `None` when level.
    pub fn leader(&self) -> Option<Side> {
        if self.home > self.away {
            Some(Side::Home)
        } else if self.away > self.home {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn winner(&self) -> SetWinner {
        if !self.finished {
            return SetWinner::Undecided;
        }
        self.leader().map_or(SetWinner::Undecided, SetWinner::from)
    }
}

/// Parses a raw set string into one [`SetResult`] per entry.
///
/// Empty or whitespace-only input yields no sets ("no data yet"). A finished
/// set that is tied cannot have a winner and is rejected; the running set may
/// be level (`0-0` right after a set ends).
pub fn parse_sets(fixture_id: &str, raw: &str) -> Result<Vec<SetResult>, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<&str> = raw.split(',').map(str::trim).collect();
    let last = entries.len() - 1;
    let mut sets = Vec::with_capacity(entries.len());

    for (idx, entry) in entries.iter().enumerate() {
        let number = idx + 1;
        let (home, away) = entry.split_once('-').ok_or_else(|| ParseError::MissingSeparator {
            fixture_id: fixture_id.to_string(),
            set: number,
            entry: entry.to_string(),
        })?;

        let invalid = || ParseError::InvalidPoints {
            fixture_id: fixture_id.to_string(),
            set: number,
            entry: entry.to_string(),
        };
        let home: u32 = home.trim().parse().map_err(|_| invalid())?;
        let away: u32 = away.trim().parse().map_err(|_| invalid())?;

        let finished = idx < last;
        if finished && home == away {
            return Err(ParseError::TiedSet {
                fixture_id: fixture_id.to_string(),
                set: number,
                home,
                away,
            });
        }

        sets.push(SetResult { number, home, away, finished });
    }

    Ok(sets)
}

// ── Match score ──────────────────────────────────────────────────────────────

/// Parsed view of one live score string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchScore {
    raw:  String,
    sets: Vec<SetResult>,
}

impl MatchScore {
    pub fn parse(fixture_id: &str, raw: &str) -> Result<Self, ParseError> {
        Ok(Self {
            raw:  raw.trim().to_string(),
            sets: parse_sets(fixture_id, raw)?,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn sets(&self) -> &[SetResult] {
        &self.sets
    }

    /// Number of entries the feed has opened so far.
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Winner of set `number` (1-based) once the feed has moved past it.
    pub fn set_winner(&self, number: usize) -> Option<Side> {
        let set = self.sets.get(number.checked_sub(1)?)?;
        if !set.finished {
            return None;
        }
        set.leader()
    }

    pub fn first_set_winner(&self) -> Option<Side> {
        self.set_winner(1)
    }

    pub fn second_set_winner(&self) -> Option<Side> {
        self.set_winner(2)
    }

    /// Finished sets taken by `side`.
    pub fn sets_won(&self, side: Side) -> usize {
        self.sets
            .iter()
            .filter(|s| s.finished && s.leader() == Some(side))
            .count()
    }

    /// True when both sides have taken the same number of finished sets.
    pub fn is_level(&self) -> bool {
        self.sets_won(Side::Home) == self.sets_won(Side::Away)
    }
}
