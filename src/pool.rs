//! Fixed-size worker pool for hashing and integrity checks
//!
//! ## Overview
//!
//! All work is enumerated before the workers start. Each worker repeatedly
//! claims the next item from a shared [`WorkQueue`] (the lock is held only for
//! the claim, never across I/O), processes it with its own [`Hasher`] and
//! reports failures into an [`ErrorCollector`]. A [`Fuse`] records that some
//! worker hit an error so the others stop claiming work in strict mode.
//!
//! Workers run on scoped threads, so work items may borrow from the caller:
//! hashing writes digests straight through `&mut FileEntry` references into
//! the caller's tree.
//!
//! ## Thread Safety
//!
//! The only shared mutable state is the queue cursor, the error collector and
//! the fuse. Digest accumulators and read buffers belong to one worker each.

use crate::error::{CairnError, Result};
use crate::hasher::Hasher;
use crate::settings::HashAlgorithm;
use crate::types::FileEntry;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

/// Pull-based queue over work enumerated up front
///
/// Every item is handed out exactly once across all workers.
pub struct WorkQueue<I: Iterator> {
    cursor: Mutex<I>,
}

impl<I: Iterator> WorkQueue<I> {
    /// Create a queue over `items`
    pub fn new<T>(items: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            cursor: Mutex::new(items.into_iter()),
        }
    }

    /// Claim the next item, or `None` once the queue is drained
    pub fn claim(&self) -> Option<I::Item> {
        self.cursor.lock().next()
    }
}

/// One-way flag: starts unset, can only ever be set
///
/// A stale read only delays noticing the set state; it never reports a
/// failure that did not happen.
#[derive(Debug, Default)]
pub struct Fuse(AtomicBool);

impl Fuse {
    /// Create an unset fuse
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Set the fuse; idempotent
    pub fn trip(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the fuse has been set
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Append-only, thread-safe list of errors
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<CairnError>>,
}

impl ErrorCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn push(&self, err: CairnError) {
        self.errors.lock().push(err);
    }

    /// Number of errors recorded so far
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Whether no error has been recorded
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Consume the collector, returning errors in arrival order
    pub fn into_inner(self) -> Vec<CairnError> {
        self.errors.into_inner()
    }
}

/// Outcome of hashing a batch of files
#[derive(Debug, Default)]
pub struct HashOutcome {
    /// Files whose digest was written
    pub hashed: usize,
    /// Failures that were skipped under the omit-errors policy
    pub skipped: Vec<CairnError>,
}

/// Fixed set of hashing workers
///
/// Each worker owns one [`Hasher`]; the pool is reusable across batches.
pub struct HasherPool {
    workers: Vec<Hasher>,
}

impl HasherPool {
    /// Create `threads` workers, each with a buffer of `buffer_size` bytes
    pub fn new(algorithm: HashAlgorithm, buffer_size: usize, threads: usize) -> Self {
        let workers = (0..threads.max(1))
            .map(|_| Hasher::new(algorithm, buffer_size))
            .collect();
        Self { workers }
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Hash every file, writing each digest into its own entry
    ///
    /// In strict mode the first failure trips the fuse, remaining workers stop
    /// claiming work and the first error is returned. With `omit_errors` set,
    /// skippable failures are logged and returned in [`HashOutcome::skipped`];
    /// those entries keep an empty hash.
    ///
    /// # Errors
    ///
    /// - The first per-file error in strict mode, or any non-skippable error
    /// - [`CairnError::ThreadPool`] if a worker panicked
    pub fn hash_files(&mut self, files: Vec<&mut FileEntry>, omit_errors: bool) -> Result<HashOutcome> {
        let total = files.len();
        let queue = WorkQueue::new(files);
        let fuse = Fuse::new();
        let errors = ErrorCollector::new();
        let hashed = Mutex::new(0usize);

        debug!("Hashing {} files with {} workers", total, self.workers.len());

        run_workers(&mut self.workers, |hasher| {
            while !fuse.is_tripped() {
                let Some(entry) = queue.claim() else { break };
                match hasher.hash_file(entry) {
                    Ok(()) => *hashed.lock() += 1,
                    Err(e) if omit_errors && e.is_skippable() => {
                        error!("{}", e);
                        errors.push(e);
                    }
                    Err(e) => {
                        fuse.trip();
                        errors.push(e);
                    }
                }
            }
        })?;

        let hashed = hashed.into_inner();
        let mut errors = errors.into_inner();
        if fuse.is_tripped() {
            if let Some(pos) = errors
                .iter()
                .position(|e| !(omit_errors && e.is_skippable()))
            {
                return Err(errors.swap_remove(pos));
            }
        }

        Ok(HashOutcome {
            hashed,
            skipped: errors,
        })
    }

    /// Verify every blob path against the hash and size in its name
    ///
    /// Never stops early: every path is visited and every failure returned.
    ///
    /// # Errors
    ///
    /// - [`CairnError::ThreadPool`] if a worker panicked
    pub fn check_paths(&mut self, paths: Vec<PathBuf>) -> Result<Vec<CairnError>> {
        debug!(
            "Checking {} blobs with {} workers",
            paths.len(),
            self.workers.len()
        );
        let queue = WorkQueue::new(paths);
        let errors = ErrorCollector::new();

        run_workers(&mut self.workers, |hasher| {
            while let Some(path) = queue.claim() {
                if let Err(e) = hasher.check_file_integrity(&path) {
                    warn!("{}", e);
                    errors.push(e);
                }
            }
        })?;

        Ok(errors.into_inner())
    }
}

/// Run `job` once per worker on scoped threads and wait for all of them
fn run_workers<F>(workers: &mut [Hasher], job: F) -> Result<()>
where
    F: Fn(&mut Hasher) + Sync,
{
    let job = &job;
    let panicked = std::thread::scope(|scope| {
        let handles: Vec<_> = workers
            .iter_mut()
            .map(|hasher| scope.spawn(move || job(hasher)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .filter(|r| r.is_err())
            .count()
    });

    if panicked > 0 {
        return Err(CairnError::ThreadPool(format!(
            "{} worker thread(s) panicked",
            panicked
        )));
    }
    Ok(())
}
