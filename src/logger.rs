use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::buffer::DoubleBuffer;
use crate::clock::{SystemWallClock, WallClock};
use crate::config::FileLoggerConfig;
use crate::diagnostics::{Diagnostics, StderrDiagnostics};
use crate::error::{FileLoggerError, LogError};
use crate::flusher::{Flusher, RotationState};
use crate::formatter::Formatter;
use crate::severity::Severity;
use crate::shared::Shared;
use crate::sink::{open_next, DiskSink, FileSink, LogFileNamer};

/// Name reported to the host.
pub const LOGGER_NAME: &str = "file logger";

/// The surface a host sees once the logger is registered.
pub trait ExtensionLogger: Send + Sync {
    fn name(&self) -> &'static str;

    /// Formats, filters, deduplicates and buffers one message. The caller
    /// context is passed through by the host and not interpreted.
    fn log(&self, severity: Severity, caller: Option<&dyn Any>, args: fmt::Arguments<'_>);

    fn shutdown(&self);
}

/// Notified by the host whenever its log level changes.
pub trait LevelObserver: Send + Sync {
    fn on_persistence_level_changed(&self, level: Severity);
}

/// What the logger needs from its host at registration time.
pub trait ServerHooks {
    /// The host's current log level, used as the initial persistence level.
    fn current_level(&self) -> Severity;

    /// Offers the logger to the host. Returns false if the host refuses it.
    fn register_logger(&self, logger: Arc<dyn ExtensionLogger>) -> bool;

    fn subscribe_level_changes(&self, observer: Arc<dyn LevelObserver>);
}

/// A disk-backed, double-buffered log sink.
///
/// Producers on any thread format their line, pass it through the severity
/// filters and the deduplicator, and copy it into the active buffer. A
/// single background thread swaps buffers and writes them out, rotating
/// files by size. When the writer cannot keep up, producers block until a
/// buffer is free rather than dropping lines.
///
/// # Examples
///
/// ```no_run
/// use file_logger::{log_line, FileLogger, FileLoggerConfig, Severity};
///
/// let config = FileLoggerConfig::default()
///     .with_filename("/tmp/server")
///     .with_pretty_print(true);
/// let logger = FileLogger::start(config)?;
///
/// log_line!(logger, Severity::Warning, "disk {} is {}% full", "/var", 93)?;
///
/// // Everything buffered is on disk once shutdown returns
/// logger.shutdown();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct FileLogger {
    shared: Arc<Shared>,
    formatter: Formatter,
    persistence_level: AtomicU8,
    echo_level: Severity,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for FileLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLogger")
            .field("persistence_level", &self.persistence_level())
            .field("echo_level", &self.echo_level)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`FileLogger`] with non-default collaborators.
pub struct FileLoggerBuilder<S> {
    config: FileLoggerConfig,
    sink: S,
    clock: Arc<dyn WallClock>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl FileLoggerBuilder<DiskSink> {
    fn new(config: FileLoggerConfig) -> Self {
        Self {
            config,
            sink: DiskSink,
            clock: Arc::new(SystemWallClock),
            diagnostics: Arc::new(StderrDiagnostics),
        }
    }
}

impl<S: FileSink> FileLoggerBuilder<S> {
    #[must_use]
    pub fn sink<T: FileSink>(self, sink: T) -> FileLoggerBuilder<T> {
        FileLoggerBuilder {
            config: self.config,
            sink,
            clock: self.clock,
            diagnostics: self.diagnostics,
        }
    }

    #[must_use]
    pub fn clock(mut self, clock: impl WallClock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn diagnostics(mut self, diagnostics: impl Diagnostics + 'static) -> Self {
        self.diagnostics = Arc::new(diagnostics);
        self
    }

    /// Validates the configuration, allocates both buffers, opens the first
    /// file and starts the flusher. Nothing is left running on failure.
    pub fn start(self) -> Result<FileLogger, FileLoggerError> {
        let FileLoggerBuilder {
            config,
            mut sink,
            clock,
            diagnostics,
        } = self;

        config.validate()?;
        let buffers = DoubleBuffer::new(config.buffer_size)?;

        let mut namer = LogFileNamer::new(config.filename.clone(), config.extension.clone());
        let file = open_next(&mut sink, &mut namer).map_err(|(path, source)| {
            tracing::error!(file = %path.display(), error = %source, "failed to open log file");
            FileLoggerError::OpenLogFile { path, source }
        })?;

        let shared = Arc::new(Shared::new(buffers, diagnostics, config.unit_test));
        let rotation = RotationState::new(file, namer, config.cycle_size);
        let handle = Flusher::new(Arc::clone(&shared), sink, rotation, config.flush_interval()).spawn()?;

        tracing::debug!(
            filename = %config.filename.display(),
            buffer_size = config.buffer_size,
            cycle_size = config.cycle_size,
            "file logger started"
        );

        Ok(FileLogger {
            shared,
            formatter: Formatter::new(clock, config.pretty_print),
            persistence_level: AtomicU8::new(config.persistence_level.code()),
            echo_level: config.echo_level,
            flusher: Mutex::new(Some(handle)),
        })
    }
}

impl FileLogger {
    /// Starts a logger writing to disk with the system clock, reporting to
    /// stderr.
    pub fn start(config: FileLoggerConfig) -> Result<Self, FileLoggerError> {
        Self::builder(config).start()
    }

    pub fn builder(config: FileLoggerConfig) -> FileLoggerBuilder<DiskSink> {
        FileLoggerBuilder::new(config)
    }

    /// Starts the logger and wires it into `host`: the host's level becomes
    /// the persistence level and later level changes are delivered to the
    /// logger.
    pub fn register(
        builder: FileLoggerBuilder<impl FileSink>,
        host: &dyn ServerHooks,
    ) -> Result<Arc<Self>, FileLoggerError> {
        let logger = Arc::new(builder.start()?);
        logger.set_persistence_level(host.current_level());

        if !host.register_logger(Arc::clone(&logger) as Arc<dyn ExtensionLogger>) {
            logger.shutdown();
            return Err(FileLoggerError::HostRejected);
        }
        host.subscribe_level_changes(Arc::clone(&logger) as Arc<dyn LevelObserver>);
        Ok(logger)
    }

    pub fn persistence_level(&self) -> Severity {
        Severity::from_code(self.persistence_level.load(Ordering::Acquire)).unwrap_or(Severity::Warning)
    }

    pub fn set_persistence_level(&self, level: Severity) {
        self.persistence_level.store(level.code(), Ordering::Release);
    }

    pub fn echo_level(&self) -> Severity {
        self.echo_level
    }

    /// Returns true if a message of `severity` would be persisted or echoed.
    pub fn enabled(&self, severity: Severity) -> bool {
        severity.passes(self.persistence_level()) || severity.passes(self.echo_level)
    }

    /// Logs one message.
    ///
    /// Returns `Ok` when the message was buffered, counted as a repeat, or
    /// filtered out by both thresholds. Every error has already been
    /// reported on the diagnostic channel.
    pub fn log(&self, severity: Severity, args: fmt::Arguments<'_>) -> Result<(), LogError> {
        let persist = severity.passes(self.persistence_level());
        let echo = severity.passes(self.echo_level);
        if !persist && !echo {
            return Ok(());
        }

        let line = self.formatter.render(severity, args).inspect_err(|e| {
            self.shared.diagnostics.report(&e.to_string());
        })?;

        if echo {
            self.shared.diagnostics.echo(&line.text);
        }
        if persist {
            self.shared.admit(&line)?;
        }
        Ok(())
    }

    /// Flushes the pending rollup, drains both buffers, closes the file and
    /// joins the flusher. Later calls return immediately; concurrent calls
    /// return once the first has finished.
    pub fn shutdown(&self) {
        let mut flusher = self.flusher.lock();
        self.shared.request_shutdown();

        if let Some(handle) = flusher.take() {
            if handle.join().is_err() {
                self.shared.diagnostics.report("file logger flusher thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }
}

impl ExtensionLogger for FileLogger {
    fn name(&self) -> &'static str {
        LOGGER_NAME
    }

    fn log(&self, severity: Severity, _caller: Option<&dyn Any>, args: fmt::Arguments<'_>) {
        let _ = FileLogger::log(self, severity, args);
    }

    fn shutdown(&self) {
        FileLogger::shutdown(self);
    }
}

impl LevelObserver for FileLogger {
    fn on_persistence_level_changed(&self, level: Severity) {
        tracing::debug!(%level, "persistence level changed");
        self.set_persistence_level(level);
    }
}

/// Best-effort safety net for loggers that are dropped without an explicit
/// shutdown.
impl Drop for FileLogger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Logs a message with `format!`-style arguments checked at compile time.
///
/// # Examples
///
/// ```no_run
/// # use file_logger::{log_line, FileLogger, FileLoggerConfig, Severity};
/// # let logger = FileLogger::start(FileLoggerConfig::default()).unwrap();
/// log_line!(logger, Severity::Info, "accepted connection from {}", "10.0.0.7").unwrap();
/// log_line!(logger, Severity::Warning, "{} of {} workers busy", 7, 8).unwrap();
/// ```
#[macro_export]
macro_rules! log_line {
    ($logger:expr, $severity:expr, $($arg:tt)+) => {
        $logger.log($severity, ::std::format_args!($($arg)+))
    };
}
