//! Coalescing timers.
//!
//! Scheduling a key that already has a timer pushes its deadline back, so a
//! burst of edits fires once, `delay` after the last one. Callers drive the
//! table with [`Debouncer::drain_due`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Timer table keyed by `K`.
#[derive(Debug, Clone)]
pub struct Debouncer<K: Ord> {
    delay: Duration,
    deadlines: BTreeMap<K, Instant>,
}

impl<K: Ord + Clone> Debouncer<K> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadlines: BTreeMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start or restart the timer of `key`.
    pub fn schedule(&mut self, key: K, now: Instant) {
        self.deadlines.insert(key, now + self.delay);
    }

    /// Drop the timer of `key`. Returns true if one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    /// Move a pending timer to a new key, keeping its deadline.
    pub fn rekey(&mut self, from: &K, to: K) -> bool {
        match self.deadlines.remove(from) {
            Some(deadline) => {
                self.deadlines.insert(to, deadline);
                true
            }
            None => false,
        }
    }

    /// Drop every timer matching `predicate`. Returns how many were dropped.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let before = self.deadlines.len();
        self.deadlines.retain(|key, _| !predicate(key));
        before - self.deadlines.len()
    }

    /// Drop every timer.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    /// Remove and return every key whose deadline has passed, earliest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(Instant, K)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (*deadline, key.clone()))
            .collect();
        for (_, key) in &due {
            self.deadlines.remove(key);
        }
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(1400);

    #[test]
    fn test_restart_pushes_deadline() {
        let start = Instant::now();
        let mut timers = Debouncer::new(DELAY);
        for i in 0..5 {
            timers.schedule("web", start + Duration::from_millis(i * 100));
        }
        assert!(timers.drain_due(start + DELAY).is_empty());
        assert_eq!(
            timers.drain_due(start + Duration::from_millis(400) + DELAY),
            vec!["web"]
        );
        assert!(timers.is_empty());
    }

    #[test]
    fn test_drain_orders_by_deadline() {
        let start = Instant::now();
        let mut timers = Debouncer::new(DELAY);
        timers.schedule("b", start);
        timers.schedule("a", start + Duration::from_millis(10));
        let due = timers.drain_due(start + Duration::from_secs(5));
        assert_eq!(due, vec!["b", "a"]);
    }

    #[test]
    fn test_cancel_where() {
        let start = Instant::now();
        let mut timers = Debouncer::new(DELAY);
        timers.schedule(("ws1".to_string(), "web".to_string()), start);
        timers.schedule(("ws1".to_string(), "db".to_string()), start);
        timers.schedule(("ws2".to_string(), "web".to_string()), start);

        let edge = ("ws1".to_string(), "edge".to_string());
        assert!(timers.rekey(&("ws1".to_string(), "web".to_string()), edge.clone()));
        assert!(timers.is_pending(&edge));
        assert_eq!(timers.cancel_where(|(ws, _)| ws == "ws1"), 2);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(start + DELAY));
    }
}
