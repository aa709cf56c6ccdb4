//! Storage behind the flusher.
//!
//! [`FileSink`] is the open/write/flush/close seam the flusher drives.
//! [`DiskSink`] writes through unbuffered `std::fs::File` handles, since the
//! logger already batches in memory. [`MemorySink`] keeps every file in
//! memory and can inject faults, which makes flusher behaviour deterministic
//! under test.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Consecutive transient write failures tolerated before giving up on a buffer.
pub const MAX_WRITE_RETRIES: usize = 3;

/// Pause between transient write retries.
pub const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Physical storage for log files.
///
/// Implementations are moved into the flusher thread and only ever used
/// from there.
pub trait FileSink: Send + 'static {
    type Handle: Send + 'static;

    /// Returns true if something already exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Creates a new file at `path`. Must fail with
    /// [`ErrorKind::AlreadyExists`] rather than truncate an existing file.
    fn open(&mut self, path: &Path) -> io::Result<Self::Handle>;

    /// Writes some prefix of `bytes` and returns its length.
    fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> io::Result<usize>;

    fn flush(&mut self, handle: &mut Self::Handle) -> io::Result<()>;

    fn close(&mut self, handle: Self::Handle) -> io::Result<()>;
}

/// A write that stopped before every byte was accepted.
#[derive(Debug, thiserror::Error)]
#[error("write failed after {written} bytes: {source}")]
pub struct PartialWrite {
    pub written: usize,
    #[source]
    pub source: io::Error,
}

/// Writes all of `bytes`, looping over short writes.
///
/// Interrupted, would-block and zero-length writes are retried up to
/// [`MAX_WRITE_RETRIES`] times in a row; any other error is fatal.
pub fn write_fully<S: FileSink>(
    sink: &mut S,
    handle: &mut S::Handle,
    bytes: &[u8],
) -> Result<(), PartialWrite> {
    let mut written = 0;
    let mut stalls = 0;

    while written < bytes.len() {
        let transient = match sink.write(handle, &bytes[written..]) {
            Ok(0) => io::Error::new(ErrorKind::WriteZero, "sink accepted no bytes"),
            Ok(n) => {
                written += n;
                stalls = 0;
                continue;
            }
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => e,
            Err(source) => return Err(PartialWrite { written, source }),
        };

        stalls += 1;
        if stalls > MAX_WRITE_RETRIES {
            return Err(PartialWrite {
                written,
                source: transient,
            });
        }
        tracing::debug!(error = %transient, attempt = stalls, "retrying log write");
        std::thread::sleep(RETRY_DELAY);
    }

    Ok(())
}

/// Produces `<base>.<sequence>.<extension>` names with a strictly increasing
/// sequence.
///
/// ```
/// # use file_logger::sink::LogFileNamer;
/// # use std::path::{Path, PathBuf};
/// let mut namer = LogFileNamer::new("logs/memcached", "txt");
/// let taken = PathBuf::from("logs/memcached.0.txt");
/// let (seq, path) = namer.next_free(|p| p == taken.as_path());
/// assert_eq!(seq, 1);
/// assert_eq!(path, Path::new("logs/memcached.1.txt"));
/// ```
#[derive(Debug, Clone)]
pub struct LogFileNamer {
    base: PathBuf,
    extension: String,
    next_sequence: u64,
}

impl LogFileNamer {
    pub fn new(base: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            extension: extension.into(),
            next_sequence: 0,
        }
    }

    pub fn path_for(&self, sequence: u64) -> PathBuf {
        let mut name = OsString::from(self.base.as_os_str());
        name.push(format!(".{}.{}", sequence, self.extension));
        PathBuf::from(name)
    }

    /// Consumes sequence numbers until one names a path for which `exists`
    /// is false. Consumed numbers are never handed out again.
    pub fn next_free(&mut self, exists: impl Fn(&Path) -> bool) -> (u64, PathBuf) {
        loop {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            let path = self.path_for(sequence);
            if !exists(&path) {
                return (sequence, path);
            }
        }
    }
}

/// An open log file together with its name.
#[derive(Debug)]
pub struct OpenFile<H> {
    pub path: PathBuf,
    pub handle: H,
}

/// Opens the next unused log file. Files created concurrently by someone
/// else between the existence check and the open are skipped too.
pub fn open_next<S: FileSink>(
    sink: &mut S,
    namer: &mut LogFileNamer,
) -> Result<OpenFile<S::Handle>, (PathBuf, io::Error)> {
    loop {
        let (_, path) = namer.next_free(|p| sink.exists(p));
        match sink.open(&path) {
            Ok(handle) => return Ok(OpenFile { path, handle }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err((path, e)),
        }
    }
}

/// Unbuffered files on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSink;

impl FileSink for DiskSink {
    type Handle = File;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn open(&mut self, path: &Path) -> io::Result<File> {
        OpenOptions::new().write(true).create_new(true).open(path)
    }

    fn write(&mut self, handle: &mut File, bytes: &[u8]) -> io::Result<usize> {
        handle.write(bytes)
    }

    fn flush(&mut self, handle: &mut File) -> io::Result<()> {
        handle.flush()
    }

    fn close(&mut self, handle: File) -> io::Result<()> {
        handle.sync_all()
    }
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: BTreeMap<PathBuf, Vec<u8>>,
    opened: Vec<PathBuf>,
    closed: Vec<PathBuf>,
    write_calls: usize,
    flushes: usize,
    failing_opens: usize,
    fatal_writes: usize,
    transient_writes: usize,
    failing_flushes: usize,
    max_chunk: Option<usize>,
    paused: bool,
}

/// In-memory stand-in for the filesystem.
///
/// Clones share the same files, so a test keeps one clone for inspection
/// while the logger owns the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<(Mutex<MemoryFiles>, Condvar)>,
}

/// Handle to a file inside a [`MemorySink`].
#[derive(Debug)]
pub struct MemoryHandle {
    path: PathBuf,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a file before the logger starts, as if left by an earlier run.
    pub fn seed(&self, path: impl Into<PathBuf>, contents: &[u8]) {
        self.inner.0.lock().files.insert(path.into(), contents.to_vec());
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.inner.0.lock().failing_opens = count;
    }

    /// Makes the next `count` writes fail with a fatal error.
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.0.lock().fatal_writes = count;
    }

    /// Makes the next `count` writes report `Interrupted`.
    pub fn interrupt_next_writes(&self, count: usize) {
        self.inner.0.lock().transient_writes = count;
    }

    /// Makes the next `count` flushes fail.
    pub fn fail_next_flushes(&self, count: usize) {
        self.inner.0.lock().failing_flushes = count;
    }

    /// Caps how many bytes a single write call accepts.
    pub fn limit_write_size(&self, max_chunk: usize) {
        self.inner.0.lock().max_chunk = Some(max_chunk.max(1));
    }

    /// Blocks every write until [`MemorySink::resume`] is called.
    pub fn pause(&self) {
        self.inner.0.lock().paused = true;
    }

    pub fn resume(&self) {
        let (lock, cond) = &*self.inner;
        lock.lock().paused = false;
        cond.notify_all();
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.inner.0.lock().files.get(path.as_ref()).cloned()
    }

    /// Paths opened by the sink, in order.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.inner.0.lock().opened.clone()
    }

    pub fn closed(&self) -> Vec<PathBuf> {
        self.inner.0.lock().closed.clone()
    }

    /// Contents of every file the sink opened, concatenated in open order.
    pub fn text(&self) -> String {
        let state = self.inner.0.lock();
        let mut out = String::new();
        for path in &state.opened {
            if let Some(bytes) = state.files.get(path) {
                out.push_str(&String::from_utf8_lossy(bytes));
            }
        }
        out
    }

    pub fn write_calls(&self) -> usize {
        self.inner.0.lock().write_calls
    }

    pub fn flushes(&self) -> usize {
        self.inner.0.lock().flushes
    }
}

impl FileSink for MemorySink {
    type Handle = MemoryHandle;

    fn exists(&self, path: &Path) -> bool {
        self.inner.0.lock().files.contains_key(path)
    }

    fn open(&mut self, path: &Path) -> io::Result<MemoryHandle> {
        let mut state = self.inner.0.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(io::Error::new(ErrorKind::PermissionDenied, "injected open failure"));
        }
        if state.files.contains_key(path) {
            return Err(io::Error::new(ErrorKind::AlreadyExists, "file exists"));
        }
        state.files.insert(path.to_path_buf(), Vec::new());
        state.opened.push(path.to_path_buf());
        Ok(MemoryHandle {
            path: path.to_path_buf(),
        })
    }

    fn write(&mut self, handle: &mut MemoryHandle, bytes: &[u8]) -> io::Result<usize> {
        let (lock, cond) = &*self.inner;
        let mut state = lock.lock();
        while state.paused {
            cond.wait(&mut state);
        }
        state.write_calls += 1;

        if state.fatal_writes > 0 {
            state.fatal_writes -= 1;
            return Err(io::Error::other("injected write failure"));
        }
        if state.transient_writes > 0 {
            state.transient_writes -= 1;
            return Err(io::Error::new(ErrorKind::Interrupted, "injected interruption"));
        }

        let len = state.max_chunk.map_or(bytes.len(), |max| max.min(bytes.len()));
        state
            .files
            .entry(handle.path.clone())
            .or_default()
            .extend_from_slice(&bytes[..len]);
        Ok(len)
    }

    fn flush(&mut self, _handle: &mut MemoryHandle) -> io::Result<()> {
        let mut state = self.inner.0.lock();
        state.flushes += 1;
        if state.failing_flushes > 0 {
            state.failing_flushes -= 1;
            return Err(io::Error::other("injected flush failure"));
        }
        Ok(())
    }

    fn close(&mut self, handle: MemoryHandle) -> io::Result<()> {
        self.inner.0.lock().closed.push(handle.path);
        Ok(())
    }
}
