//! State shared between producers and the flusher, and the blocking append
//! protocol that runs on top of it.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::buffer::DoubleBuffer;
use crate::dedup::{DedupState, Verdict};
use crate::diagnostics::Diagnostics;
use crate::error::LogError;
use crate::formatter::LogLine;

pub(crate) const WAITING_FOR_SPACE: &str = "WARNING: waiting for log space to be available";

/// Everything guarded by the single logger mutex.
#[derive(Debug)]
pub(crate) struct State {
    pub buffers: DoubleBuffer,
    pub dedup: DedupState,
    /// Cleared by shutdown; no new lines are admitted afterwards.
    pub running: bool,
    /// Set by the flusher once its final drain is done.
    pub flusher_exited: bool,
    /// A producer could not fit its line and wants a drain now.
    pub flush_requested: bool,
    /// Producers currently blocked in the append protocol.
    pub waiting: usize,
    next_ticket: u64,
    now_serving: u64,
}

impl State {
    pub fn new(buffers: DoubleBuffer) -> Self {
        Self {
            buffers,
            dedup: DedupState::new(),
            running: true,
            flusher_exited: false,
            flush_requested: false,
            waiting: 0,
            next_ticket: 0,
            now_serving: 0,
        }
    }
}

pub(crate) struct Shared {
    pub state: Mutex<State>,
    /// The flusher sleeps here until its deadline or an early-flush signal.
    pub flush_cond: Condvar,
    /// Producers sleep here until a swap frees space.
    pub space_cond: Condvar,
    pub diagnostics: Arc<dyn Diagnostics>,
    pub unit_test: bool,
}

impl Shared {
    pub fn new(buffers: DoubleBuffer, diagnostics: Arc<dyn Diagnostics>, unit_test: bool) -> Self {
        Self {
            state: Mutex::new(State::new(buffers)),
            flush_cond: Condvar::new(),
            space_cond: Condvar::new(),
            diagnostics,
            unit_test,
        }
    }

    /// Runs a persisted line through deduplication and into the active
    /// buffer. May block until the flusher frees space.
    pub fn admit(&self, line: &LogLine) -> Result<(), LogError> {
        let mut guard = self.state.lock();
        let capacity = guard.buffers.capacity();

        let result = if line.len() > capacity {
            Err(LogError::ExceedsBuffer {
                len: line.len(),
                capacity,
            })
        } else if !guard.running {
            Err(LogError::ShutDown)
        } else {
            match guard.dedup.admit(line) {
                Verdict::Repeat => Ok(()),
                Verdict::Emit { rollup: None } => self.append(&mut guard, &[line.as_bytes()]),
                Verdict::Emit {
                    rollup: Some(rollup),
                } => self.append(&mut guard, &[rollup.as_bytes(), line.as_bytes()]),
            }
        };
        drop(guard);

        if let Err(e) = &result {
            self.diagnostics.report(&e.to_string());
        }
        result
    }

    /// Stops admitting lines and emits any pending rollup. Returns false if
    /// shutdown had already been requested.
    pub fn request_shutdown(&self) -> bool {
        let mut guard = self.state.lock();
        if !guard.running {
            return false;
        }
        // Cleared first: the rollup append may wait for space and release
        // the lock, and no repeat may be counted after the rollup is taken.
        guard.running = false;
        if let Some(rollup) = guard.dedup.take_rollup() {
            if let Err(e) = self.append(&mut guard, &[rollup.as_bytes()]) {
                self.diagnostics.report(&e.to_string());
            }
        }
        self.flush_cond.notify_one();
        true
    }

    /// Appends `chunks` back to back in lock-acquisition order.
    ///
    /// Each caller takes a ticket; only the holder of the ticket being
    /// served may append, so a producer that has to wait for space cannot be
    /// overtaken by one that arrived later.
    fn append(&self, guard: &mut MutexGuard<'_, State>, chunks: &[&[u8]]) -> Result<(), LogError> {
        let ticket = guard.next_ticket;
        guard.next_ticket += 1;

        let mut result = Ok(());
        for chunk in chunks {
            if let Err(e) = self.wait_for_space(guard, ticket, chunk.len()) {
                result = Err(e);
                break;
            }
            guard.buffers.append(chunk);
        }

        guard.now_serving += 1;
        if guard.waiting > 0 {
            self.space_cond.notify_all();
        }
        if guard.buffers.nearly_full() {
            self.flush_cond.notify_one();
        }
        result
    }

    fn wait_for_space(
        &self,
        guard: &mut MutexGuard<'_, State>,
        ticket: u64,
        len: usize,
    ) -> Result<(), LogError> {
        let mut warned = false;
        loop {
            if guard.now_serving == ticket && guard.buffers.fits(len) {
                return Ok(());
            }
            if guard.flusher_exited {
                return Err(LogError::ShutDown);
            }
            if guard.now_serving == ticket {
                guard.flush_requested = true;
                self.flush_cond.notify_one();
                if !warned && !self.unit_test {
                    warned = true;
                    self.diagnostics.report(WAITING_FOR_SPACE);
                }
            }
            guard.waiting += 1;
            self.space_cond.wait(guard);
            guard.waiting -= 1;
        }
    }
}
