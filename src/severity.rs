use std::fmt;
use std::str::FromStr;

use crate::error::FileLoggerError;

/// Urgency classification of a log message.
///
/// Variants are declared from most verbose to most urgent, so the derived
/// ordering makes `Warning` the greatest value. A threshold retains a message
/// when `severity >= threshold`.
///
/// ```
/// # use file_logger::Severity;
/// assert!(Severity::Warning > Severity::Info);
/// assert!(Severity::Debug.passes(Severity::Detail));
/// assert!(!Severity::Debug.passes(Severity::Info));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Detail = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Detail,
        Severity::Debug,
        Severity::Info,
        Severity::Warning,
    ];

    /// Returns true if a message of this severity is retained by `threshold`.
    #[inline]
    pub fn passes(self, threshold: Severity) -> bool {
        self >= threshold
    }

    /// Numeric code printed when pretty printing is disabled.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Severity::Detail => "DETAIL",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
        }
    }

    /// Inverse of [`Severity::code`]. Unknown codes yield `None`.
    pub const fn from_code(code: u8) -> Option<Severity> {
        match code {
            0 => Some(Severity::Detail),
            1 => Some(Severity::Debug),
            2 => Some(Severity::Info),
            3 => Some(Severity::Warning),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Severity {
    type Err = FileLoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|sev| sev.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FileLoggerError::UnknownLogLevel(s.to_string()))
    }
}

impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error | log::Level::Warn => Severity::Warning,
            log::Level::Info => Severity::Info,
            log::Level::Debug => Severity::Debug,
            log::Level::Trace => Severity::Detail,
        }
    }
}

impl From<Severity> for log::LevelFilter {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Warning => log::LevelFilter::Warn,
            Severity::Info => log::LevelFilter::Info,
            Severity::Debug => log::LevelFilter::Debug,
            Severity::Detail => log::LevelFilter::Trace,
        }
    }
}
