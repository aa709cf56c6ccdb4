//! Collapsing of consecutive duplicate lines.

use crate::formatter::LogLine;

/// Bodies longer than this are never stored and always count as distinct.
pub const DEDUP_CAPACITY: usize = 512;

/// Outcome of offering a line to the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Same body as the previous line; only the counter moved.
    Repeat,
    /// Buffer the line, preceded by the rollup if one was pending.
    Emit { rollup: Option<String> },
}

/// Last admitted body and how many times it has been repeated since.
///
/// Always accessed under the logger's shared lock.
#[derive(Debug)]
pub struct DedupState {
    last: Vec<u8>,
    has_last: bool,
    repeats: u64,
}

impl Default for DedupState {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupState {
    pub fn new() -> Self {
        Self {
            last: Vec::with_capacity(DEDUP_CAPACITY),
            has_last: false,
            repeats: 0,
        }
    }

    pub fn repeats(&self) -> u64 {
        self.repeats
    }

    /// Offers a line that passed the persistence filter.
    pub fn admit(&mut self, line: &LogLine) -> Verdict {
        let body = line.body();

        if body.len() > DEDUP_CAPACITY {
            let rollup = self.take_rollup();
            self.last.clear();
            self.has_last = false;
            return Verdict::Emit { rollup };
        }

        if self.has_last && self.last == body {
            self.repeats += 1;
            return Verdict::Repeat;
        }

        let rollup = self.take_rollup();
        self.last.clear();
        self.last.extend_from_slice(body);
        self.has_last = true;
        Verdict::Emit { rollup }
    }

    /// Takes the pending rollup line, if any, and zeroes the counter.
    pub fn take_rollup(&mut self) -> Option<String> {
        if self.repeats == 0 {
            return None;
        }
        let rollup = rollup_line(self.repeats);
        self.repeats = 0;
        Some(rollup)
    }
}

pub fn rollup_line(repeats: u64) -> String {
    format!("message repeated {repeats} times\n")
}
