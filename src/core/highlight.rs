// Companion - core/highlight.rs
//
// "Recently added" marks for rows that arrived in a recent merge.
//
// Each key carries its own expiry, so a burst of arrivals a few seconds after
// another never shortens or cancels the earlier marks. Time is passed in by
// the caller, which keeps this module free of clocks and easy to test.

use crate::core::model::EntryKey;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Set of entry keys marked as recently added, each with its own expiry.
#[derive(Debug, Clone)]
pub struct RecentlyAdded {
    ttl: Duration,
    expiries: HashMap<EntryKey, Instant>,
}

impl RecentlyAdded {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            expiries: HashMap::new(),
        }
    }

    /// Mark `keys` as added at `now`. Re-marking a key restarts only its own timer.
    pub fn mark<'a>(&mut self, keys: impl IntoIterator<Item = &'a EntryKey>, now: Instant) {
        let expires_at = now + self.ttl;
        for key in keys {
            self.expiries.insert(key.clone(), expires_at);
        }
    }

    /// True if `key` is marked and its mark has not yet expired at `now`.
    pub fn is_marked(&self, key: &EntryKey, now: Instant) -> bool {
        self.expiries.get(key).is_some_and(|&at| now < at)
    }

    /// Remove marks that have expired by `now`. Returns how many were removed.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.expiries.len();
        self.expiries.retain(|_, at| now < *at);
        before - self.expiries.len()
    }

    /// Drop marks for keys no longer present, e.g. after eviction.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(&EntryKey) -> bool) {
        self.expiries.retain(|k, _| keep(k));
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }

    pub fn clear(&mut self) {
        self.expiries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::LogEntry;

    fn key(seq: u64) -> EntryKey {
        LogEntry::new("ns1", seq, Some("2024-05-01T10:00:00Z"), None).key()
    }

    #[test]
    fn test_mark_then_expire_after_ttl() {
        let t0 = Instant::now();
        let mut marks = RecentlyAdded::new(Duration::from_secs(10));
        marks.mark([&key(1)], t0);

        assert!(marks.is_marked(&key(1), t0 + Duration::from_secs(9)));
        assert!(!marks.is_marked(&key(1), t0 + Duration::from_secs(10)));

        assert_eq!(marks.expire(t0 + Duration::from_secs(9)), 0);
        assert_eq!(marks.expire(t0 + Duration::from_secs(10)), 1);
        assert!(marks.is_empty());
    }

    #[test]
    fn test_overlapping_arrivals_expire_independently() {
        let t0 = Instant::now();
        let mut marks = RecentlyAdded::new(Duration::from_secs(10));
        marks.mark([&key(1)], t0);
        marks.mark([&key(2)], t0 + Duration::from_secs(6));

        let t = t0 + Duration::from_secs(11);
        assert_eq!(marks.expire(t), 1);
        assert!(!marks.is_marked(&key(1), t));
        assert!(marks.is_marked(&key(2), t));
    }

    #[test]
    fn test_remark_extends_only_that_key() {
        let t0 = Instant::now();
        let mut marks = RecentlyAdded::new(Duration::from_secs(10));
        marks.mark([&key(1), &key(2)], t0);
        marks.mark([&key(1)], t0 + Duration::from_secs(5));

        let t = t0 + Duration::from_secs(12);
        marks.expire(t);
        assert!(marks.is_marked(&key(1), t));
        assert!(!marks.is_marked(&key(2), t));
    }

    #[test]
    fn test_retain_keys_drops_evicted() {
        let t0 = Instant::now();
        let mut marks = RecentlyAdded::new(Duration::from_secs(10));
        marks.mark([&key(1), &key(2)], t0);
        marks.retain_keys(|k| k.sequence == 2);
        assert_eq!(marks.len(), 1);
        assert!(marks.is_marked(&key(2), t0));
    }
}
