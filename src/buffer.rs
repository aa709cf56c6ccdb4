//! Fixed-capacity double buffer.
//!
//! Two byte regions of equal capacity exist for the lifetime of the logger.
//! Producers append to the active one while the flusher owns the other. The
//! swap is a single index flip performed under the shared lock; the flusher
//! then takes the inactive region's bytes out of the lock, writes them, and
//! hands the (cleared) allocation back.
//!
//! Nothing in here locks. Every method expects the caller to hold the
//! logger's shared mutex.

use crate::error::FileLoggerError;

/// Fill ratio above which producers ask the flusher to drain early.
pub const EARLY_FLUSH_RATIO: f64 = 0.75;

/// One fixed-capacity region. The write offset is `data.len()`.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Buffer {
    fn allocate(capacity: usize) -> Result<Self, FileLoggerError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|source| FileLoggerError::BufferAllocation {
                size: capacity,
                source,
            })?;
        Ok(Self { data, capacity })
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn fits(&self, len: usize) -> bool {
        self.data.len() + len <= self.capacity
    }
}

/// The pair of buffers plus the index of the active one.
#[derive(Debug)]
pub struct DoubleBuffer {
    buffers: [Buffer; 2],
    active: usize,
    capacity: usize,
}

impl DoubleBuffer {
    /// Allocates both regions up front. Fails rather than aborting when the
    /// allocator cannot satisfy the request.
    pub fn new(capacity: usize) -> Result<Self, FileLoggerError> {
        Ok(Self {
            buffers: [Buffer::allocate(capacity)?, Buffer::allocate(capacity)?],
            active: 0,
            capacity,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active(&self) -> &Buffer {
        &self.buffers[self.active]
    }

    /// Returns true if `len` more bytes fit into the active buffer.
    #[inline]
    pub fn fits(&self, len: usize) -> bool {
        self.active().fits(len)
    }

    /// Copies `bytes` into the active buffer.
    ///
    /// The caller must have checked [`DoubleBuffer::fits`]; the offset never
    /// exceeds the capacity.
    pub fn append(&mut self, bytes: &[u8]) {
        let active = &mut self.buffers[self.active];
        debug_assert!(active.fits(bytes.len()), "append past buffer capacity");
        active.data.extend_from_slice(bytes);
    }

    /// Returns true once the active buffer is more than 75% full.
    pub fn nearly_full(&self) -> bool {
        self.active().offset() as f64 > self.capacity as f64 * EARLY_FLUSH_RATIO
    }

    pub fn is_active_empty(&self) -> bool {
        self.active().offset() == 0
    }

    /// Makes the other buffer active and returns the index of the one that
    /// was active until now.
    pub fn swap(&mut self) -> usize {
        let previous = self.active;
        self.active ^= 1;
        previous
    }

    /// Moves the bytes of an inactive buffer out so they can be written
    /// without holding the lock.
    pub fn take(&mut self, index: usize) -> Vec<u8> {
        debug_assert_ne!(index, self.active, "cannot drain the active buffer");
        std::mem::take(&mut self.buffers[index].data)
    }

    /// Returns a drained allocation to its slot with the offset reset to 0.
    pub fn restore(&mut self, index: usize, mut data: Vec<u8>) {
        data.clear();
        self.buffers[index].data = data;
    }
}
