//! Monotonic event generation counter.
//!
//! A [`Generation`] is advanced by exactly one producer (typically an
//! interrupt handler) and read by any number of consumers, each of which
//! remembers the last value it acted on. The counter is 64 bits wide and
//! compared by modular distance, so a consumer never mistakes a full
//! wraparound for "no new events".

use super::loom_compat::{AtomicU64, Ordering};

/// A single-writer, multi-reader event counter.
pub struct Generation {
    count: AtomicU64,
}

impl Generation {
    /// Creates a counter at generation zero.
    #[cfg(not(loom))]
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Creates a counter at generation zero.
    #[cfg(loom)]
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Records one new event and returns the new generation.
    ///
    /// Wait-free; safe to call from interrupt context.
    pub fn advance(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Release).wrapping_add(1)
    }

    /// Returns the latest generation.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Returns how many events occurred since `seen`.
    #[must_use]
    pub fn distance_from(&self, seen: u64) -> u64 {
        self.current().wrapping_sub(seen)
    }

    /// Returns `true` if at least one event occurred since `seen`.
    #[must_use]
    pub fn is_ahead_of(&self, seen: u64) -> bool {
        self.distance_from(seen) != 0
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let generation = Generation::new();
        assert_eq!(generation.current(), 0);
        assert!(!generation.is_ahead_of(0));
    }

    #[test]
    fn advance_returns_new_value() {
        let generation = Generation::new();
        assert_eq!(generation.advance(), 1);
        assert_eq!(generation.advance(), 2);
        assert_eq!(generation.current(), 2);
    }

    #[test]
    fn distance_counts_missed_events() {
        let generation = Generation::new();
        for _ in 0..3 {
            generation.advance();
        }
        assert_eq!(generation.distance_from(1), 2);
        assert!(generation.is_ahead_of(1));
        assert!(!generation.is_ahead_of(3));
    }

    #[test]
    fn distance_survives_wraparound() {
        let generation = Generation {
            count: AtomicU64::new(u64::MAX),
        };
        let seen = generation.current();
        generation.advance();
        assert_eq!(generation.current(), 0);
        assert_eq!(generation.distance_from(seen), 1);
        assert!(generation.is_ahead_of(seen));
    }

    #[test]
    fn concurrent_producers_do_not_lose_events() {
        use std::sync::Arc;

        let generation = Arc::new(Generation::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generation = Arc::clone(&generation);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        generation.advance();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(generation.current(), 2000);
    }
}
