//! Wall-clock utilities for the timestamp prefix of every log line.
//!
//! The clock sits behind a trait so tests can pin the time (and simulate a
//! failing clock) without touching the system time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, TimeZone};

/// A point in wall-clock time, expressed as seconds and microseconds since
/// the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WallTime {
    pub secs: i64,
    pub micros: u32,
}

impl WallTime {
    pub fn from_duration(since_epoch: Duration) -> Self {
        Self {
            secs: since_epoch.as_secs() as i64,
            micros: since_epoch.subsec_micros(),
        }
    }

    /// Renders the timestamp prefix.
    ///
    /// Uses the `asctime` layout without the trailing year, followed by
    /// microseconds and the local UTC offset:
    /// `Sat Oct 17 05:47:12.123456 +0000`. If the instant cannot be
    /// represented in local time the numeric form `secs.micros` is used.
    pub fn render_prefix(&self) -> String {
        match Local.timestamp_opt(self.secs, self.micros * 1_000).single() {
            Some(local) => render_local(&local, self.micros),
            None => format!("{}.{:06}", self.secs, self.micros),
        }
    }
}

fn render_local(local: &DateTime<Local>, micros: u32) -> String {
    format!(
        "{}.{:06} {}",
        local.format("%a %b %e %H:%M:%S"),
        micros,
        local.format("%z")
    )
}

/// Error returned when the wall clock cannot be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ClockError(pub String);

/// Source of wall-clock time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> Result<WallTime, ClockError>;
}

/// Reads the system clock.
///
/// Fails when the system time is set before the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> Result<WallTime, ClockError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(WallTime::from_duration)
            .map_err(|e| ClockError(format!("gettimeofday failed: {e}")))
    }
}

/// A clock pinned to one instant, or permanently failing.
///
/// # Examples
///
/// ```
/// # use file_logger::clock::{FixedClock, WallClock};
/// let clock = FixedClock::at(1_700_000_000, 42);
/// assert_eq!(clock.now().unwrap().micros, 42);
/// assert!(FixedClock::failing().now().is_err());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    time: Option<WallTime>,
}

impl FixedClock {
    pub const fn at(secs: i64, micros: u32) -> Self {
        Self {
            time: Some(WallTime { secs, micros }),
        }
    }

    pub const fn failing() -> Self {
        Self { time: None }
    }
}

impl WallClock for FixedClock {
    fn now(&self) -> Result<WallTime, ClockError> {
        self.time
            .ok_or_else(|| ClockError("clock unavailable".to_string()))
    }
}
