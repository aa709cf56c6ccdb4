use std::path::PathBuf;
use std::time::Duration;

use crate::error::FileLoggerError;
use crate::severity::Severity;

/// Smallest accepted buffer: room for a rollup line and a short message.
pub const MIN_BUFFER_SIZE: usize = 128;

/// Flusher wait used instead of `sleep_time` when `unit_test` is set.
pub const UNIT_TEST_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for a [`FileLogger`](crate::FileLogger), supplied once at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLoggerConfig {
    /// Base path of the log files (`filename`)
    pub filename: PathBuf,

    /// Extension appended after the sequence number
    pub extension: String,

    /// Capacity of each of the two buffers (`buffersize`, default: 2MB)
    pub buffer_size: usize,

    /// Bytes written to one file before rotating (`cyclesize`, default: 100MB)
    pub cycle_size: u64,

    /// Messages at or above this level are echoed to stderr (`loglevel`)
    pub echo_level: Severity,

    /// Messages at or above this level are written to the file. Replaced by
    /// the host's level on registration and on every level change.
    pub persistence_level: Severity,

    /// Render severities as labels instead of numeric codes (`prettyprint`)
    pub pretty_print: bool,

    /// Periodic flush interval (`sleeptime`, default: 60s)
    pub sleep_time: Duration,

    /// Short flush interval and no backpressure warnings (`unit_test`)
    pub unit_test: bool,
}

impl Default for FileLoggerConfig {
    fn default() -> Self {
        Self {
            filename: PathBuf::from("memcached"),
            extension: "txt".into(),
            buffer_size: 2 * 1024 * 1024,
            cycle_size: 100 * 1024 * 1024,
            echo_level: Severity::Warning,
            persistence_level: Severity::Warning,
            pretty_print: false,
            sleep_time: Duration::from_secs(60),
            unit_test: false,
        }
    }
}

impl FileLoggerConfig {
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = filename.into();
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn with_cycle_size(mut self, cycle_size: u64) -> Self {
        self.cycle_size = cycle_size;
        self
    }

    #[must_use]
    pub fn with_echo_level(mut self, level: Severity) -> Self {
        self.echo_level = level;
        self
    }

    #[must_use]
    pub fn with_persistence_level(mut self, level: Severity) -> Self {
        self.persistence_level = level;
        self
    }

    #[must_use]
    pub fn with_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    #[must_use]
    pub fn with_sleep_time(mut self, sleep_time: Duration) -> Self {
        self.sleep_time = sleep_time;
        self
    }

    #[must_use]
    pub fn with_unit_test(mut self, unit_test: bool) -> Self {
        self.unit_test = unit_test;
        self
    }

    /// Sets the echo level from its option value (`warning`, `info`,
    /// `debug` or `detail`, any case).
    pub fn with_log_level(mut self, name: &str) -> Result<Self, FileLoggerError> {
        self.echo_level = name.parse()?;
        Ok(self)
    }

    /// How long the flusher sleeps between periodic drains.
    pub fn flush_interval(&self) -> Duration {
        if self.unit_test {
            UNIT_TEST_FLUSH_INTERVAL
        } else {
            self.sleep_time
        }
    }

    pub fn validate(&self) -> Result<(), FileLoggerError> {
        if self.filename.as_os_str().is_empty() {
            return Err(FileLoggerError::InvalidConfig("filename must not be empty".into()));
        }
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(FileLoggerError::InvalidConfig(format!(
                "buffersize must be at least {MIN_BUFFER_SIZE} bytes, got {}",
                self.buffer_size
            )));
        }
        if self.cycle_size == 0 {
            return Err(FileLoggerError::InvalidConfig("cyclesize must be positive".into()));
        }
        if self.sleep_time.is_zero() {
            return Err(FileLoggerError::InvalidConfig("sleeptime must be positive".into()));
        }
        Ok(())
    }
}
