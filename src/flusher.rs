//! The background thread that drains buffers to disk and rotates files.
//!
//! The flusher is the only consumer. It sleeps on the flush condition until
//! its periodic deadline passes or a producer signals that the active buffer
//! is filling up, then swaps buffers under the lock and writes the
//! deactivated one with the lock released.
//!
//! ```text
//!            deadline / early signal
//!   Idle ─────────────────────────────► Draining ──(file > cyclesize)──► Rotating
//!    ▲                                     │                               │
//!    └─────────────────────────────────────┴───────────────────────────────┘
//!    │ running cleared
//!    ▼
//!   ShuttingDown: drain until empty, close file, exit
//! ```

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::MutexGuard;

use crate::error::FileLoggerError;
use crate::shared::{Shared, State};
use crate::sink::{open_next, write_fully, FileSink, LogFileNamer, OpenFile};

/// How often the final drain re-checks for producers still blocked on space.
const FINAL_DRAIN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Draining,
    Rotating,
    ShuttingDown,
}

/// The currently open file and how much has been written to it.
///
/// Only the flusher thread touches this, so it lives outside the shared
/// lock.
pub(crate) struct RotationState<H> {
    file: OpenFile<H>,
    bytes_in_file: u64,
    cycle_size: u64,
    namer: LogFileNamer,
}

impl<H> RotationState<H> {
    pub fn new(file: OpenFile<H>, namer: LogFileNamer, cycle_size: u64) -> Self {
        Self {
            file,
            bytes_in_file: 0,
            cycle_size,
            namer,
        }
    }

    fn due(&self) -> bool {
        self.bytes_in_file > self.cycle_size
    }
}

pub(crate) struct Flusher<S: FileSink> {
    shared: Arc<Shared>,
    sink: S,
    rotation: RotationState<S::Handle>,
    interval: Duration,
}

impl<S: FileSink> Flusher<S> {
    pub fn new(shared: Arc<Shared>, sink: S, rotation: RotationState<S::Handle>, interval: Duration) -> Self {
        Self {
            shared,
            sink,
            rotation,
            interval,
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>, FileLoggerError> {
        std::thread::Builder::new()
            .name("file-logger-flusher".into())
            .spawn(move || self.run())
            .map_err(FileLoggerError::SpawnFlusher)
    }

    fn run(mut self) {
        tracing::debug!(file = %self.rotation.file.path.display(), "flusher started");

        let shared = Arc::clone(&self.shared);
        let mut guard = shared.state.lock();
        let mut deadline = Instant::now() + self.interval;
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle => {
                    let now = Instant::now();
                    if !guard.running {
                        Phase::ShuttingDown
                    } else if now >= deadline || guard.flush_requested || guard.buffers.nearly_full() {
                        Phase::Draining
                    } else {
                        shared.flush_cond.wait_for(&mut guard, deadline - now);
                        Phase::Idle
                    }
                }
                Phase::Draining => {
                    deadline = Instant::now() + self.interval;
                    guard.flush_requested = false;
                    if !guard.buffers.is_active_empty() {
                        self.drain(&mut guard);
                    }
                    if self.rotation.due() {
                        Phase::Rotating
                    } else {
                        Phase::Idle
                    }
                }
                Phase::Rotating => {
                    MutexGuard::unlocked(&mut guard, || self.rotate());
                    Phase::Idle
                }
                Phase::ShuttingDown => {
                    self.final_drain(&mut guard);
                    break;
                }
            };
        }

        guard.flusher_exited = true;
        shared.space_cond.notify_all();
        drop(guard);

        self.finish();
    }

    /// Flips the active buffer and writes the one that was active until now.
    fn drain(&mut self, guard: &mut MutexGuard<'_, State>) {
        let index = guard.buffers.swap();
        let data = guard.buffers.take(index);
        self.shared.space_cond.notify_all();

        MutexGuard::unlocked(guard, || self.write_out(&data));

        guard.buffers.restore(index, data);
    }

    fn write_out(&mut self, data: &[u8]) {
        let file = &mut self.rotation.file;
        let written = match write_fully(&mut self.sink, &mut file.handle, data) {
            Ok(()) => data.len(),
            Err(e) => {
                tracing::error!(
                    file = %file.path.display(),
                    written = e.written,
                    dropped = data.len() - e.written,
                    error = %e.source,
                    "log write failed"
                );
                self.shared.diagnostics.report(&format!(
                    "Failed to write {} bytes to {}: {}",
                    data.len() - e.written,
                    file.path.display(),
                    e.source
                ));
                e.written
            }
        };
        if let Err(e) = self.sink.flush(&mut file.handle) {
            tracing::warn!(file = %file.path.display(), error = %e, "log flush failed");
            self.shared
                .diagnostics
                .report(&format!("Failed to flush {}: {}", file.path.display(), e));
        }

        self.rotation.bytes_in_file += written as u64;
        tracing::trace!(bytes = written, file = %file.path.display(), "drained log buffer");
    }

    /// Opens the next file and only then closes the current one. If the open
    /// fails the current file stays in use and rotation is retried after the
    /// next drain.
    fn rotate(&mut self) {
        match open_next(&mut self.sink, &mut self.rotation.namer) {
            Ok(next) => {
                let previous = std::mem::replace(&mut self.rotation.file, next);
                let previous_bytes = std::mem::replace(&mut self.rotation.bytes_in_file, 0);
                tracing::info!(
                    from = %previous.path.display(),
                    to = %self.rotation.file.path.display(),
                    bytes = previous_bytes,
                    "rotated log file"
                );
                self.close(previous.handle, &previous.path);
            }
            Err((path, e)) => {
                tracing::warn!(
                    file = %path.display(),
                    current = %self.rotation.file.path.display(),
                    error = %e,
                    "log rotation failed"
                );
                self.shared.diagnostics.report(&format!(
                    "Failed to open log file {}: {}; still writing to {}",
                    path.display(),
                    e,
                    self.rotation.file.path.display()
                ));
            }
        }
    }

    /// Drains whatever is left, including lines appended by producers that
    /// were blocked on space when shutdown began.
    fn final_drain(&mut self, guard: &mut MutexGuard<'_, State>) {
        loop {
            if !guard.buffers.is_active_empty() {
                self.drain(guard);
                if self.rotation.due() {
                    MutexGuard::unlocked(guard, || self.rotate());
                }
                continue;
            }
            if guard.waiting == 0 {
                break;
            }
            self.shared.space_cond.notify_all();
            self.shared.flush_cond.wait_for(guard, FINAL_DRAIN_POLL);
        }
    }

    fn finish(self) {
        let Flusher {
            mut sink, rotation, ..
        } = self;
        let OpenFile { mut handle, path, .. } = rotation.file;
        if let Err(e) = sink.flush(&mut handle) {
            tracing::warn!(file = %path.display(), error = %e, "log flush failed");
        }
        if let Err(e) = sink.close(handle) {
            tracing::warn!(file = %path.display(), error = %e, "closing log file failed");
        }
        tracing::debug!(file = %path.display(), "flusher exited");
    }

    fn close(&mut self, handle: S::Handle, path: &Path) {
        if let Err(e) = self.sink.close(handle) {
            tracing::warn!(file = %path.display(), error = %e, "closing log file failed");
        }
    }
}
