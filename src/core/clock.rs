//! Wall-clock access and the cooperative tick source.
//!
//! State transitions never read the clock themselves; the store and the
//! reward engine ask an injected `Clock` for `now` and pass it down. Timed
//! effects (focus countdown, combo window expiry) are polled from a
//! `Ticker`, so each tick is a plain read of `now`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::core::model::EpochMs;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> EpochMs;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_ms(&self) -> EpochMs {
        (**self).now_ms()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> EpochMs {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: EpochMs) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: EpochMs) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> EpochMs {
        self.now.load(Ordering::SeqCst)
    }
}

/// Fixed-interval tick source polled by its owner.
///
/// Independent tickers share no ordering; a late poll fires once and
/// schedules the next tick relative to the poll time.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval_ms: i64,
    next_due: Option<EpochMs>,
}

impl Ticker {
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            next_due: None,
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Returns `true` when a tick is due at `now`. The first poll always ticks.
    pub fn poll(&mut self, now: EpochMs) -> bool {
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.interval_ms);
                true
            }
        }
    }

    /// Milliseconds until the next tick, zero if one is due.
    pub fn until_next(&self, now: EpochMs) -> i64 {
        self.next_due.map(|due| (due - now).max(0)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01 in epoch ms.
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_ticker_fires_on_interval() {
        let mut ticker = Ticker::new(1_000);
        assert!(ticker.poll(0));
        assert!(!ticker.poll(999));
        assert_eq!(ticker.until_next(400), 600);
        assert!(ticker.poll(1_000));
        assert!(!ticker.poll(1_500));
    }

    #[test]
    fn test_late_poll_fires_once() {
        let mut ticker = Ticker::new(100);
        assert!(ticker.poll(0));
        assert!(ticker.poll(1_000));
        assert!(!ticker.poll(1_050));
        assert!(ticker.poll(1_100));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        assert_eq!(Ticker::new(0).interval_ms(), 1);
    }
}
