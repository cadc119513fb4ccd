// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Application timers
//!
//! A fixed table of named timers checked against the millisecond clock.
//! Timers never call back; the owner polls [`Timers::poll_expired`] after
//! each clock update and posts the task that handles the expiry.

use q_common::{Error, Instant, Millis, Result};

#[derive(Debug, Clone, Copy)]
struct TimerSlot<K> {
    key: K,
    deadline: Instant,
    period: Option<Millis>,
}

/// Table of up to `N` timers keyed by `K`
#[derive(Debug, Clone)]
pub struct Timers<K: Copy + Eq, const N: usize> {
    slots: [Option<TimerSlot<K>>; N],
}

impl<K: Copy + Eq, const N: usize> Timers<K, N> {
    /// Create a table with no running timers
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    fn find(&self, key: K) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|slot| slot.key == key))
    }

    fn arm(&mut self, key: K, deadline: Instant, period: Option<Millis>) -> Result<()> {
        let idx = match self.find(key) {
            Some(idx) => idx,
            None => self
                .slots
                .iter()
                .position(Option::is_none)
                .ok_or(Error::TimerExhausted)?,
        };
        self.slots[idx] = Some(TimerSlot {
            key,
            deadline,
            period,
        });
        Ok(())
    }

    /// Start (or restart) a one-shot timer
    ///
    /// # Errors
    /// `TimerExhausted` if the table is full.
    pub fn start(&mut self, key: K, now: Instant, timeout: Millis) -> Result<()> {
        self.arm(key, now + timeout, None)
    }

    /// Start (or restart) a periodic timer
    ///
    /// # Errors
    /// `TimerExhausted` if the table is full, `InvalidParameter` for a zero
    /// period.
    pub fn start_periodic(&mut self, key: K, now: Instant, period: Millis) -> Result<()> {
        if period == Millis::ZERO {
            return Err(Error::InvalidParameter);
        }
        self.arm(key, now + period, Some(period))
    }

    /// Stop a timer; returns whether it was running
    pub fn stop(&mut self, key: K) -> bool {
        match self.find(key) {
            Some(idx) => {
                self.slots[idx] = None;
                true
            }
            None => false,
        }
    }

    /// Check whether a timer is running
    #[must_use]
    pub fn is_running(&self, key: K) -> bool {
        self.find(key).is_some()
    }

    /// Deadline of a running timer
    #[must_use]
    pub fn deadline(&self, key: K) -> Option<Instant> {
        self.find(key)
            .and_then(|idx| self.slots[idx].map(|slot| slot.deadline))
    }

    /// Take one expired timer
    ///
    /// One-shot timers are removed; periodic timers are re-armed one period
    /// after their previous deadline. Call repeatedly until `None`.
    pub fn poll_expired(&mut self, now: Instant) -> Option<K> {
        for slot in &mut self.slots {
            let Some(timer) = slot else { continue };
            if !now.has_reached(timer.deadline) {
                continue;
            }
            let key = timer.key;
            let period = timer.period;
            match period {
                Some(period) => {
                    timer.deadline = timer.deadline + period;
                    // Skip missed periods instead of firing a burst
                    if now.has_reached(timer.deadline) {
                        timer.deadline = now + period;
                    }
                }
                None => *slot = None,
            }
            return Some(key);
        }
        None
    }

    /// Earliest deadline among running timers
    #[must_use]
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.deadline)
            .min_by_key(|deadline| deadline.since(now))
    }

    /// Stop every timer
    pub fn clear(&mut self) {
        self.slots = [None; N];
    }
}

impl<K: Copy + Eq, const N: usize> Default for Timers<K, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Key {
        Scan,
        Beacon,
        Age,
    }

    #[test]
    fn test_one_shot() {
        let mut t: Timers<Key, 4> = Timers::new();
        let now = Instant::from_millis(100);
        t.start(Key::Scan, now, Millis::new(50)).unwrap();
        assert_eq!(t.poll_expired(Instant::from_millis(149)), None);
        assert_eq!(t.poll_expired(Instant::from_millis(150)), Some(Key::Scan));
        assert!(!t.is_running(Key::Scan));
    }

    #[test]
    fn test_restart_replaces_deadline() {
        let mut t: Timers<Key, 2> = Timers::new();
        t.start(Key::Beacon, Instant::ZERO, Millis::new(10)).unwrap();
        t.start(Key::Beacon, Instant::ZERO, Millis::new(30)).unwrap();
        assert_eq!(t.deadline(Key::Beacon), Some(Instant::from_millis(30)));
        assert_eq!(t.poll_expired(Instant::from_millis(20)), None);
    }

    #[test]
    fn test_periodic_rearms() {
        let mut t: Timers<Key, 2> = Timers::new();
        t.start_periodic(Key::Age, Instant::ZERO, Millis::new(100)).unwrap();
        assert_eq!(t.poll_expired(Instant::from_millis(100)), Some(Key::Age));
        assert_eq!(t.deadline(Key::Age), Some(Instant::from_millis(200)));
        // Late poll skips the missed periods
        assert_eq!(t.poll_expired(Instant::from_millis(750)), Some(Key::Age));
        assert_eq!(t.deadline(Key::Age), Some(Instant::from_millis(850)));
    }

    #[test]
    fn test_exhaustion() {
        let mut t: Timers<Key, 1> = Timers::new();
        t.start(Key::Scan, Instant::ZERO, Millis::new(1)).unwrap();
        assert_eq!(
            t.start(Key::Beacon, Instant::ZERO, Millis::new(1)),
            Err(Error::TimerExhausted)
        );
        assert!(t.stop(Key::Scan));
        assert!(!t.stop(Key::Scan));
    }

    #[test]
    fn test_next_deadline() {
        let mut t: Timers<Key, 3> = Timers::new();
        let now = Instant::from_millis(1_000);
        t.start(Key::Scan, now, Millis::new(500)).unwrap();
        t.start(Key::Beacon, now, Millis::new(200)).unwrap();
        assert_eq!(t.next_deadline(now), Some(Instant::from_millis(1_200)));
    }
}
