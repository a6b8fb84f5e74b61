//! One-shot timer table owned by the core loop.
//!
//! Every delayed action (numeric commit, hold detection, quality tick, EPG
//! refresh, playback retry, notice expiry) is a deadline keyed by its kind.
//! Scheduling a kind that is already pending supersedes it, so at most one
//! timer per kind exists.  The loop sleeps until [`Timers::next_deadline`] and
//! drains [`Timers::poll_expired`].

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Delayed actions of the live core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Numeric entry went quiet: look the number up.
    NumericCommit,
    /// Select held long enough to open the channel list.
    SelectHold,
    QualityTick,
    EpgRefresh,
    /// Reload the current URL after a fatal playback error.
    PlaybackRetry,
}

/// Handle to a scheduled timer.  Only valid while its generation is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle<K> {
    pub kind: K,
    generation: u64,
}

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    generation: u64,
}

#[derive(Debug)]
pub struct Timers<K> {
    entries: HashMap<K, Entry>,
    generation: u64,
}

impl<K: Copy + Eq + Hash> Default for Timers<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> Timers<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            generation: 0,
        }
    }

    /// Arm `kind` to fire `after` from `now`, replacing any pending one.
    pub fn schedule(&mut self, kind: K, now: Instant, after: Duration) -> TimerHandle<K> {
        self.generation += 1;
        self.entries.insert(
            kind,
            Entry {
                deadline: now + after,
                generation: self.generation,
            },
        );
        TimerHandle {
            kind,
            generation: self.generation,
        }
    }

    pub fn cancel(&mut self, kind: K) {
        self.entries.remove(&kind);
    }

    /// Cancel only if `handle` still names the pending timer.
    pub fn cancel_handle(&mut self, handle: TimerHandle<K>) {
        if self.is_current(handle) {
            self.entries.remove(&handle.kind);
        }
    }

    pub fn is_current(&self, handle: TimerHandle<K>) -> bool {
        self.entries
            .get(&handle.kind)
            .is_some_and(|e| e.generation == handle.generation)
    }

    pub fn is_pending(&self, kind: K) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    /// Remove and return every kind whose deadline is at or before `now`,
    /// earliest first.
    pub fn poll_expired(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(Instant, K)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(k, e)| (e.deadline, *k))
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);
        for (_, kind) in &due {
            self.entries.remove(kind);
        }
        due.into_iter().map(|(_, k)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        A,
        B,
    }

    #[test]
    fn test_schedule_supersedes_same_kind() {
        let mut timers = Timers::new();
        let t0 = Instant::now();
        let first = timers.schedule(Kind::A, t0, Duration::from_secs(2));
        let second = timers.schedule(Kind::A, t0, Duration::from_secs(5));
        assert!(!timers.is_current(first));
        assert!(timers.is_current(second));
        assert!(timers.poll_expired(t0 + Duration::from_secs(3)).is_empty());
        assert_eq!(timers.poll_expired(t0 + Duration::from_secs(5)), vec![Kind::A]);
        assert!(!timers.is_pending(Kind::A));
    }

    #[test]
    fn test_poll_orders_by_deadline() {
        let mut timers = Timers::new();
        let t0 = Instant::now();
        timers.schedule(Kind::A, t0, Duration::from_millis(900));
        timers.schedule(Kind::B, t0, Duration::from_millis(100));
        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_millis(100)));
        assert_eq!(
            timers.poll_expired(t0 + Duration::from_secs(1)),
            vec![Kind::B, Kind::A]
        );
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_stale_handle_cannot_cancel_newer_timer() {
        let mut timers = Timers::new();
        let t0 = Instant::now();
        let stale = timers.schedule(Kind::A, t0, Duration::from_secs(1));
        timers.schedule(Kind::A, t0, Duration::from_secs(2));
        timers.cancel_handle(stale);
        assert!(timers.is_pending(Kind::A));
        timers.cancel_all();
        assert!(!timers.is_pending(Kind::A));
    }
}
