//! Process-local record of fixtures already looked at and already monitored.

use std::collections::{HashMap, HashSet};

use chrono::{Days, NaiveDate};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct DedupState {
    day:        Option<NaiveDate>,
    /// fixture id → day the task was launched
    claimed:    HashMap<String, NaiveDate>,
    seen_today: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct DedupCache {
    state: Mutex<DedupState>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the cache to `today`. Clears the seen set and keeps claims from
    /// today and yesterday only, so a match running past midnight is not
    /// launched twice. Returns true when the day changed.
    pub fn roll_day(&self, today: NaiveDate) -> bool {
        let mut state = self.state.lock();
        if state.day == Some(today) {
            return false;
        }
        let keep_from = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        state.claimed.retain(|_, day| *day >= keep_from);
        state.seen_today.clear();
        state.day = Some(today);
        true
    }

    /// Atomically claims `fixture_id` for a task. Only the first caller gets `true`.
    pub fn try_claim(&self, fixture_id: &str, today: NaiveDate) -> bool {
        let mut state = self.state.lock();
        if state.claimed.contains_key(fixture_id) {
            return false;
        }
        state.claimed.insert(fixture_id.to_string(), today);
        true
    }

    pub fn is_claimed(&self, fixture_id: &str) -> bool {
        self.state.lock().claimed.contains_key(fixture_id)
    }

    /// Returns true the first time an id is seen today.
    pub fn mark_seen(&self, fixture_id: &str) -> bool {
        self.state.lock().seen_today.insert(fixture_id.to_string())
    }

    pub fn is_seen(&self, fixture_id: &str) -> bool {
        self.state.lock().seen_today.contains(fixture_id)
    }

    pub fn claimed_len(&self) -> usize {
        self.state.lock().claimed.len()
    }

    pub fn seen_len(&self) -> usize {
        self.state.lock().seen_today.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    #[test]
    fn second_claim_is_refused() {
        let cache = DedupCache::new();
        assert!(cache.try_claim("100", day(1)));
        assert!(!cache.try_claim("100", day(1)));
        assert!(cache.is_claimed("100"));
        assert_eq!(cache.claimed_len(), 1);
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let cache = Arc::new(DedupCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.try_claim("race", day(1)))
            })
            .collect();
        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn seen_set_resets_each_day() {
        let cache = DedupCache::new();
        assert!(cache.roll_day(day(1)));
        assert!(!cache.roll_day(day(1)));

        assert!(cache.mark_seen("a"));
        assert!(!cache.mark_seen("a"));
        assert!(cache.is_seen("a"));

        assert!(cache.roll_day(day(2)));
        assert!(!cache.is_seen("a"));
        assert_eq!(cache.seen_len(), 0);
    }

    #[test]
    fn claims_survive_one_midnight() {
        let cache = DedupCache::new();
        cache.roll_day(day(1));
        cache.try_claim("late", day(1));

        cache.roll_day(day(2));
        assert!(cache.is_claimed("late"));
        assert!(!cache.try_claim("late", day(2)));

        cache.roll_day(day(3));
        assert!(!cache.is_claimed("late"));
    }
}
