//! Bridge from the `log` crate macros to a [`FileLogger`].
//!
//! `error!` and `warn!` map to [`Severity::Warning`], `info!` to `Info`,
//! `debug!` to `Debug` and `trace!` to `Detail`.

use std::sync::Arc;

use log::{Log, Metadata, Record};

use crate::logger::FileLogger;
use crate::severity::Severity;

pub struct LogFacade {
    logger: Arc<FileLogger>,
}

impl LogFacade {
    pub fn new(logger: Arc<FileLogger>) -> Self {
        Self { logger }
    }

    /// Installs the facade as the process-wide `log` backend. The `log` max
    /// level is set to the more verbose of the two thresholds.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        let most_verbose = self.logger.persistence_level().min(self.logger.echo_level());
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(most_verbose.into());
        Ok(())
    }
}

impl Log for LogFacade {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.logger.enabled(Severity::from(metadata.level()))
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = self.logger.log(record.level().into(), *record.args());
    }

    // Lines reach disk on the flusher's schedule; there is nothing to force here.
    fn flush(&self) {}
}
