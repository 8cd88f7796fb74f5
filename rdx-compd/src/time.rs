//! Wall-clock sources and the tick driver.
//!
//! Controllers never call `Utc::now()` directly. They read the wall clock
//! through a [`TimeSource`] so that tests can drive real time by hand with a
//! [`ManualClock`] while the production binary uses [`WallClock`].

use crate::common::RealTime;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Anything that can tell the current wall-clock time in whole seconds.
pub trait TimeSource: Send + Sync + fmt::Debug {
    fn now(&self) -> RealTime;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> RealTime {
        Utc::now().timestamp()
    }
}

/// A wall clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: RealTime) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, now: RealTime) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> RealTime {
        self.now.load(Ordering::SeqCst)
    }
}

/// A single beat of a [`SystemClock`].
#[derive(Debug, Clone)]
pub struct TickEvent {
    /// Number of ticks fired before this one.
    pub tick_count: u64,
    pub timestamp: Instant,
}

/// A fixed-period ticker driving a controller loop.
///
/// Missed ticks are skipped rather than burst, so a slow store round-trip
/// delays the next heartbeat instead of producing a flurry of them.
#[derive(Debug)]
pub struct SystemClock {
    interval: Interval,
    tick_count: u64,
}

impl SystemClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            tick_count: 0,
        }
    }

    /// Waits for the next tick. Cancel-safe, so it can sit in a `select!`.
    pub async fn tick(&mut self) -> TickEvent {
        let timestamp = self.interval.tick().await;
        let event = TickEvent {
            tick_count: self.tick_count,
            timestamp,
        };
        self.tick_count += 1;
        event
    }
}

/// Renders a wall-clock time for log lines, e.g. `Sat 14:05:00 BST`.
pub fn format_real_time(real_time: RealTime, timezone: &Tz) -> String {
    match DateTime::<Utc>::from_timestamp(real_time, 0) {
        Some(utc) => utc
            .with_timezone(timezone)
            .format("%a %H:%M:%S %Z")
            .to_string(),
        None => format!("@{real_time}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1000);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now(), 1005);
        other.set(2000);
        assert_eq!(clock.now(), 2000);
    }

    #[test]
    fn formats_in_configured_zone() {
        // 2024-01-01T12:00:00Z
        let rendered = format_real_time(1_704_110_400, &chrono_tz::Europe::London);
        assert_eq!(rendered, "Mon 12:00:00 GMT");
    }

    #[tokio::test]
    async fn system_clock_counts_ticks() {
        let mut clock = SystemClock::new(Duration::from_millis(5));
        assert_eq!(clock.tick().await.tick_count, 0);
        assert_eq!(clock.tick().await.tick_count, 1);
    }
}
