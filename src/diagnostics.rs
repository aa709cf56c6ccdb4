//! The standard-error channel.
//!
//! Echoed log lines and the logger's own diagnostics (dropped messages,
//! write failures, backpressure warnings) go here rather than to the log
//! file. Tests swap in [`CapturedDiagnostics`] to observe them.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

pub trait Diagnostics: Send + Sync {
    /// Mirrors an already rendered, newline-terminated log line.
    fn echo(&self, line: &str);

    /// Reports a problem with the logger itself.
    fn report(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrDiagnostics;

impl Diagnostics for StderrDiagnostics {
    fn echo(&self, line: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }

    fn report(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct CapturedDiagnostics {
    echoed: Arc<Mutex<Vec<String>>>,
    reports: Arc<Mutex<Vec<String>>>,
}

impl CapturedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echoed(&self) -> Vec<String> {
        self.echoed.lock().clone()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl Diagnostics for CapturedDiagnostics {
    fn echo(&self, line: &str) {
        self.echoed.lock().push(line.to_string());
    }

    fn report(&self, message: &str) {
        self.reports.lock().push(message.to_string());
    }
}
