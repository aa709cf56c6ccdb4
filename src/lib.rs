//! # File Logger
//!
//! An in-process, disk-backed log sink for servers that log from many
//! threads at a high, bursty rate:
//!
//! * **Bounded memory**: two fixed-size buffers, nothing else grows
//! * **No silent loss**: producers block for space instead of dropping lines
//! * **Disk latency stays off the hot path**: file I/O happens on one
//!   background thread, outside the shared lock
//!
//! ## Main Components
//!
//! * `Formatter`: renders `<timestamp> <tz> <severity>: <message>\n`
//! * `DedupState`: collapses consecutive repeats into
//!   `message repeated N times`
//! * `DoubleBuffer`: the two buffers and the active index
//! * `flusher`: the background drain / rotation thread
//! * `FileSink`: storage seam, with `DiskSink` and the in-memory `MemorySink`
//! * `FileLogger`: the logger context tying it all together
//!
//! ## Quick Start
//!
//! ```
//! use file_logger::{log_line, FileLogger, FileLoggerConfig, MemorySink, Severity};
//!
//! let sink = MemorySink::new();
//! let config = FileLoggerConfig::default()
//!     .with_pretty_print(true)
//!     .with_unit_test(true);
//! let logger = FileLogger::builder(config).sink(sink.clone()).start().unwrap();
//!
//! log_line!(logger, Severity::Warning, "connection reset").unwrap();
//! log_line!(logger, Severity::Warning, "connection reset").unwrap();
//! log_line!(logger, Severity::Warning, "connection established").unwrap();
//! logger.shutdown();
//!
//! let text = sink.text();
//! assert!(text.contains("message repeated 1 times\n"));
//! ```

pub mod buffer;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod diagnostics;
pub mod error;
pub mod facade;
mod flusher;
pub mod formatter;
pub mod logger;
pub mod severity;
mod shared;
pub mod sink;

pub use clock::{FixedClock, SystemWallClock, WallClock};
pub use config::FileLoggerConfig;
pub use diagnostics::{CapturedDiagnostics, Diagnostics, StderrDiagnostics};
pub use error::{FileLoggerError, LogError};
pub use facade::LogFacade;
pub use formatter::{Formatter, LogLine, MAX_LINE_LENGTH};
pub use logger::{ExtensionLogger, FileLogger, FileLoggerBuilder, LevelObserver, ServerHooks};
pub use severity::Severity;
pub use sink::{DiskSink, FileSink, MemorySink};
