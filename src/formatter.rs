//! Rendering of a severity and message into a single text line.

use std::fmt::{self, Write};
use std::sync::Arc;

use crate::clock::WallClock;
use crate::error::LogError;
use crate::severity::Severity;

/// Longest line (including the trailing newline) the logger will accept.
pub const MAX_LINE_LENGTH: usize = 2048;

/// A rendered log line.
///
/// `text` is `<timestamp> <tz> <severity>: <message>\n`. The first
/// `prefix_len` bytes are the timestamp and zone, which deduplication
/// ignores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub severity: Severity,
    pub text: String,
    pub prefix_len: usize,
}

impl LogLine {
    /// Everything after the timestamp prefix.
    pub fn body(&self) -> &[u8] {
        &self.text.as_bytes()[self.prefix_len..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A `String` writer that refuses to grow past `limit` bytes.
struct CappedWriter {
    text: String,
    limit: usize,
    overflowed: bool,
}

impl Write for CappedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.text.len() + s.len() > self.limit {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        self.text.push_str(s);
        Ok(())
    }
}

/// Stateless line renderer. Reads the wall clock on every call.
#[derive(Clone)]
pub struct Formatter {
    clock: Arc<dyn WallClock>,
    pretty_print: bool,
}

impl Formatter {
    pub fn new(clock: Arc<dyn WallClock>, pretty_print: bool) -> Self {
        Self { clock, pretty_print }
    }

    /// Renders one line.
    ///
    /// Fails if the wall clock cannot be read, if an argument fails to
    /// format, or if the rendered line would exceed [`MAX_LINE_LENGTH`]. A
    /// line is never truncated, and rendering stops as soon as the limit is
    /// crossed.
    pub fn render(&self, severity: Severity, args: fmt::Arguments<'_>) -> Result<LogLine, LogError> {
        let now = self.clock.now().map_err(|e| LogError::Clock(e.to_string()))?;

        let mut out = CappedWriter {
            text: String::with_capacity(128),
            limit: MAX_LINE_LENGTH,
            overflowed: false,
        };
        out.text.push_str(&now.render_prefix());
        let prefix_len = out.text.len();

        let written = if self.pretty_print {
            write!(out, " {}: {}", severity.label(), args)
        } else {
            write!(out, " {}: {}", severity.code(), args)
        };
        let too_long = LogError::TooLong { max: MAX_LINE_LENGTH };
        // Checked before the result: an impl may swallow the overflow error
        if out.overflowed {
            return Err(too_long);
        }
        written.map_err(|_| LogError::Format)?;

        let mut text = out.text;
        if !text.ends_with('\n') {
            if text.len() == MAX_LINE_LENGTH {
                return Err(too_long);
            }
            text.push('\n');
        }

        Ok(LogLine {
            severity,
            text,
            prefix_len,
        })
    }
}
