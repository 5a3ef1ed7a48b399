//! Reusable per-worker task resources.
//!
//! Each queue owns a fixed cache of these; a worker checks one out for the
//! duration of a task and the queue takes it back on every exit path. The
//! buffers and child vectors are allocated once at queue construction and
//! reused for the life of the run.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entry::{Entry, EntryPair};

/// Smallest read issued by the streaming byte-compare.
pub const MIN_READ: usize = 1 << 14;
/// Read size ceiling; also the compare buffer size.
pub const MAX_READ: usize = 1 << 20;
/// Initial capacity of the per-directory child vectors.
pub const CHILD_RESERVE: usize = 4_096;

/// A progress gauge owned by a resource and mirrored by its queue slot, so
/// status snapshots can read it while the resource is checked out by a
/// worker. What the number means depends on the resource kind.
#[derive(Debug, Clone, Default)]
pub struct ProgressGauge(Arc<AtomicU64>);

impl ProgressGauge {
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn shared(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.0)
    }
}

/// Scratch state owned by exactly one worker at a time: either checked into
/// its queue's cache or checked out by the worker running a task.
pub trait TaskResource: Send + 'static {
    fn new() -> Self;

    /// Queue-side handle to this resource's progress gauge.
    fn progress_handle(&self) -> Arc<AtomicU64>;

    /// Reset for the next task. Runs before the task body.
    fn setup(&mut self, pair: &EntryPair);

    /// Release per-task state. Safe to call repeatedly; runs on every exit
    /// path, unwinding included.
    fn teardown(&mut self);
}

/// Copy scratch. Progress is the bytes copied so far by the current task.
#[derive(Debug, Default)]
pub struct CopyResource {
    pub progress: ProgressGauge,
}

impl TaskResource for CopyResource {
    fn new() -> Self {
        Self::default()
    }

    fn progress_handle(&self) -> Arc<AtomicU64> {
        self.progress.shared()
    }

    fn setup(&mut self, _pair: &EntryPair) {
        self.progress.set(0);
    }

    fn teardown(&mut self) {}
}

/// Remove scratch. Progress is the task start time in milliseconds since the
/// epoch, which lets status displays show how long a delete has been
/// running.
#[derive(Debug, Default)]
pub struct RemoveResource {
    pub progress: ProgressGauge,
}

impl TaskResource for RemoveResource {
    fn new() -> Self {
        Self::default()
    }

    fn progress_handle(&self) -> Arc<AtomicU64> {
        self.progress.shared()
    }

    fn setup(&mut self, _pair: &EntryPair) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        self.progress.set(now_ms);
    }

    fn teardown(&mut self) {}
}

/// One side of a streaming byte-compare: an optional open file plus a
/// reusable read buffer sized to [`MAX_READ`].
#[derive(Debug)]
pub struct FileReadHalf {
    pub buffer: Vec<u8>,
    file: Option<File>,
}

impl FileReadHalf {
    fn new() -> Self {
        Self {
            buffer: vec![0u8; MAX_READ],
            file: None,
        }
    }

    pub fn open(&mut self, path: &Path) -> io::Result<()> {
        self.file = Some(File::open(path)?);
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Fill the front of the buffer with exactly `len` bytes.
    pub fn read_exact(&mut self, len: usize) -> io::Result<()> {
        debug_assert!(len <= self.buffer.len());
        match self.file.as_mut() {
            Some(file) => file.read_exact(&mut self.buffer[..len]),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream is not open",
            )),
        }
    }
}

/// File-compare scratch. Progress is the current percentage (0-100).
#[derive(Debug)]
pub struct FileCompareResource {
    pub progress: ProgressGauge,
    pub src: FileReadHalf,
    pub dst: FileReadHalf,
}

impl FileCompareResource {
    /// Closes both streams. Idempotent; also called by `teardown`, but the
    /// comparer invokes it directly before surfacing a `Modified` mismatch
    /// so that no copy or remove worker ever sees these files open.
    pub fn close_streams(&mut self) {
        self.src.close();
        self.dst.close();
    }
}

impl TaskResource for FileCompareResource {
    fn new() -> Self {
        Self {
            progress: ProgressGauge::default(),
            src: FileReadHalf::new(),
            dst: FileReadHalf::new(),
        }
    }

    fn progress_handle(&self) -> Arc<AtomicU64> {
        self.progress.shared()
    }

    fn setup(&mut self, _pair: &EntryPair) {
        self.progress.set(0);
        self.close_streams();
    }

    fn teardown(&mut self) {
        self.close_streams();
    }
}

/// Directory-compare scratch: one pre-reserved child vector per side per
/// kind.
#[derive(Debug)]
pub struct DirCompareResource {
    pub progress: ProgressGauge,
    pub src_files: Vec<Entry>,
    pub dst_files: Vec<Entry>,
    pub src_dirs: Vec<Entry>,
    pub dst_dirs: Vec<Entry>,
}

impl DirCompareResource {
    fn clear_all(&mut self) {
        self.src_files.clear();
        self.dst_files.clear();
        self.src_dirs.clear();
        self.dst_dirs.clear();
    }
}

impl TaskResource for DirCompareResource {
    fn new() -> Self {
        Self {
            progress: ProgressGauge::default(),
            src_files: Vec::with_capacity(CHILD_RESERVE),
            dst_files: Vec::with_capacity(CHILD_RESERVE),
            src_dirs: Vec::with_capacity(CHILD_RESERVE),
            dst_dirs: Vec::with_capacity(CHILD_RESERVE),
        }
    }

    fn progress_handle(&self) -> Arc<AtomicU64> {
        self.progress.shared()
    }

    fn setup(&mut self, _pair: &EntryPair) {
        self.progress.set(0);
        self.clear_all();
    }

    fn teardown(&mut self) {
        self.clear_all();
    }
}
