use std::collections::TryReserveError;
use std::path::PathBuf;

/// Errors that make construction of a [`FileLogger`](crate::FileLogger) fail.
#[derive(Debug, thiserror::Error)]
pub enum FileLoggerError {
    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The `loglevel` option named an unknown severity
    #[error("Unknown loglevel: {0}. Use warning/info/debug/detail")]
    UnknownLogLevel(String),

    /// One of the two log buffers could not be allocated
    #[error("failed to allocate {size} bytes for the log buffers")]
    BufferAllocation {
        size: usize,
        #[source]
        source: TryReserveError,
    },

    /// The first log file could not be opened
    #[error("failed to open log file {path}")]
    OpenLogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The background flusher thread could not be started
    #[error("failed to start the flusher thread: {0}")]
    SpawnFlusher(#[source] std::io::Error),

    /// The host refused to register the logger
    #[error("host rejected logger registration")]
    HostRejected,
}

/// Reasons a single log call was dropped instead of buffered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// Rendered line exceeds the maximum line length. Rendering stops at
    /// the limit, so the full length is never known.
    #[error("log message dropped, exceeds the {max} byte limit")]
    TooLong { max: usize },

    /// An argument's formatting impl returned an error
    #[error("log message dropped, formatting an argument failed")]
    Format,

    /// Rendered line can never fit an empty buffer
    #[error("log message dropped, {len} bytes exceeds the {capacity} byte buffer")]
    ExceedsBuffer { len: usize, capacity: usize },

    /// Wall clock could not be read
    #[error("wall clock unavailable: {0}")]
    Clock(String),

    /// Logger has already been shut down
    #[error("logger is shut down")]
    ShutDown,
}
