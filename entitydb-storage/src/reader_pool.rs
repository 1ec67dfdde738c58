//! Bounded pool of read-only file handles (spec.md §4.8).
//!
//! Handles are tagged with the generation they were opened under. A
//! checkpoint bumps the generation; any handle returned from a prior
//! generation is dropped instead of recycled, since its mmap may
//! reference offsets that moved during the checkpoint.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use entitydb_core::{EntityDbError, Result};
use parking_lot::{Condvar, Mutex};

/// Default deadline for a blocking `acquire()` when no caller-supplied
/// deadline is given (spec.md §5: "every operation accepts a deadline").
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

struct PooledReader {
    file: File,
    generation: u64,
}

#[derive(Debug)]
pub struct ReaderHandle {
    file: Option<File>,
    generation: u64,
}

impl ReaderHandle {
    pub fn file(&self) -> &File {
        self.file.as_ref().expect("file taken")
    }
}

pub struct ReaderPool {
    path: PathBuf,
    max: usize,
    min_warm: usize,
    idle: Mutex<Vec<PooledReader>>,
    /// Signaled from `release`/`invalidate` so a caller blocked in
    /// `acquire` on a full pool wakes as soon as a slot might be free.
    ready: Condvar,
    generation: AtomicU64,
    total_open: AtomicUsize,
}

impl ReaderPool {
    pub fn new(path: impl Into<PathBuf>, max: usize, min_warm: usize) -> Self {
        Self {
            path: path.into(),
            max,
            min_warm,
            idle: Mutex::new(Vec::new()),
            ready: Condvar::new(),
            generation: AtomicU64::new(0),
            total_open: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every outstanding and idle handle by bumping the
    /// generation. Called immediately after a checkpoint commits.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut idle = self.idle.lock();
        self.total_open.fetch_sub(idle.len(), Ordering::SeqCst);
        idle.clear();
        self.ready.notify_all();
    }

    /// Acquire a read-only handle, blocking up to a default deadline while
    /// the pool is at capacity (spec.md §4.4/§5: "Acquire blocks when
    /// exhausted").
    pub fn acquire(&self) -> Result<ReaderHandle> {
        self.acquire_deadline(DEFAULT_ACQUIRE_TIMEOUT)
    }

    /// Acquire a read-only handle, reusing an idle one from the current
    /// generation if available, opening a fresh one if under `max`, or
    /// else blocking on a slot freed by `release`/`invalidate` until
    /// `timeout` elapses (spec.md §5 "Cancellation and timeouts": every
    /// operation accepts a deadline and unwinds to a timeout error rather
    /// than hanging indefinitely).
    pub fn acquire_deadline(&self, timeout: Duration) -> Result<ReaderHandle> {
        let deadline = Instant::now() + timeout;
        let mut idle = self.idle.lock();
        loop {
            let gen = self.generation();
            while let Some(pooled) = idle.pop() {
                if pooled.generation == gen {
                    return Ok(ReaderHandle { file: Some(pooled.file), generation: gen });
                }
                // stale generation: drop it, its slot was already counted
                // against total_open so release it here
                self.total_open.fetch_sub(1, Ordering::SeqCst);
            }
            if self.total_open.load(Ordering::SeqCst) < self.max {
                drop(idle);
                let file = File::open(&self.path)?;
                self.total_open.fetch_add(1, Ordering::SeqCst);
                return Ok(ReaderHandle { file: Some(file), generation: gen });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EntityDbError::timeout("reader pool exhausted"));
            }
            if self.ready.wait_for(&mut idle, deadline - now).timed_out() {
                return Err(EntityDbError::timeout("reader pool exhausted"));
            }
        }
    }

    /// Return a handle to the pool. Handles from a stale generation are
    /// dropped rather than recycled.
    pub fn release(&self, mut handle: ReaderHandle) {
        let current_gen = self.generation();
        if handle.generation != current_gen {
            self.total_open.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        let file = match handle.file.take() {
            Some(f) => f,
            None => return,
        };
        let mut idle = self.idle.lock();
        if idle.len() < self.max {
            idle.push(PooledReader { file, generation: current_gen });
        } else {
            self.total_open.fetch_sub(1, Ordering::SeqCst);
        }
        drop(idle);
        self.ready.notify_one();
    }

    pub fn warm(&self) -> Result<()> {
        let mut idle = self.idle.lock();
        let gen = self.generation();
        while idle.len() < self.min_warm {
            idle.push(PooledReader { file: File::open(&self.path)?, generation: gen });
            self.total_open.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
