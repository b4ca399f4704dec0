//! Repository integrity checking
//!
//! Every blob in the content store is named after its own digest and size.
//! The checker re-reads each blob and confirms both still hold.
//!
//! ## Overview
//!
//! 1. List every regular file in the 256 buckets under `files/`
//! 2. Check them on the [`HasherPool`], one [`Hasher`](crate::hasher::Hasher)
//!    per worker, using the algorithm from the repository settings
//! 3. Collect every failure into a [`CheckReport`]
//!
//! A failing blob never stops the check: all blobs are visited and every
//! problem is reported individually.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let report = repository.check()?;
//! if report.is_valid() {
//!     println!("{}", report.summary());
//! } else {
//!     for issue in &report.issues {
//!         eprintln!("{}", issue);
//!     }
//! }
//! ```

use crate::error::{CairnError, Result};
use crate::pool::HasherPool;
use crate::store::ContentStore;
use crate::types::RunConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, instrument};

/// What is wrong with a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    /// File name is not `<hex-hash>-<size>`
    MalformedName,
    /// Size on disk differs from the size in the name
    SizeMismatch,
    /// Content digest differs from the hash in the name
    HashMismatch,
    /// The blob could not be read at all
    Unreadable,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::MalformedName => "malformed name",
            IssueKind::SizeMismatch => "size mismatch",
            IssueKind::HashMismatch => "hash mismatch",
            IssueKind::Unreadable => "unreadable",
        })
    }
}

/// One problem found by the checker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityIssue {
    /// Blob path
    pub path: PathBuf,
    /// Problem category
    pub kind: IssueKind,
    /// Full error message
    pub message: String,
}

impl IntegrityIssue {
    fn from_error(err: CairnError) -> Self {
        let (path, kind) = match &err {
            CairnError::MalformedBlobName(p) => (p.clone(), IssueKind::MalformedName),
            CairnError::SizeMismatch { path, .. } => (path.clone(), IssueKind::SizeMismatch),
            CairnError::HashMismatch { path, .. } => (path.clone(), IssueKind::HashMismatch),
            CairnError::PathIo { path, .. } => (path.clone(), IssueKind::Unreadable),
            _ => (PathBuf::new(), IssueKind::Unreadable),
        };
        Self {
            path,
            kind,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of a full repository check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckReport {
    /// Blobs examined
    pub blobs_checked: usize,
    /// Every problem found, sorted by path
    pub issues: Vec<IntegrityIssue>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl CheckReport {
    /// Whether every blob passed
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Number of issues of one kind
    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!(
                "{} blobs verified in {}ms, no problems found",
                self.blobs_checked, self.duration_ms
            )
        } else {
            format!(
                "{} of {} blobs have problems ({} malformed names, {} size mismatches, {} hash mismatches, {} unreadable)",
                self.issues.len(),
                self.blobs_checked,
                self.count(IssueKind::MalformedName),
                self.count(IssueKind::SizeMismatch),
                self.count(IssueKind::HashMismatch),
                self.count(IssueKind::Unreadable),
            )
        }
    }
}

/// Verifies every blob in a repository
pub struct IntegrityChecker<'a> {
    store: &'a ContentStore,
    config: &'a RunConfig,
}

impl<'a> IntegrityChecker<'a> {
    /// Create a checker for `store`
    pub fn new(store: &'a ContentStore, config: &'a RunConfig) -> Self {
        Self { store, config }
    }

    /// Check every blob
    ///
    /// # Errors
    ///
    /// Only structural failures: the bucket directories cannot be listed or a
    /// worker thread panicked. Blob problems are returned in the report.
    #[instrument(skip(self))]
    pub fn run(&self) -> Result<CheckReport> {
        let timer = Instant::now();
        let blobs = self.store.list_blobs()?;
        let blobs_checked = blobs.len();
        info!("Checking {} blobs", blobs_checked);

        let mut pool = HasherPool::new(
            self.store.settings().hash_algorithm,
            self.config.buffer_size,
            self.config.thread_count,
        );
        let mut issues: Vec<_> = pool
            .check_paths(blobs)?
            .into_iter()
            .map(IntegrityIssue::from_error)
            .collect();
        issues.sort_by(|a, b| a.path.cmp(&b.path));

        let report = CheckReport {
            blobs_checked,
            issues,
            duration_ms: timer.elapsed().as_millis() as u64,
        };
        info!("{}", report.summary());
        Ok(report)
    }
}
