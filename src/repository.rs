//! Repository facade
//!
//! [`Repository`] ties an open [`ContentStore`] to one [`RunConfig`] and
//! exposes the user-level operations: backup, restore, check and list.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cairn::{BackupOptions, HashAlgorithm, RepositoryBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = RepositoryBuilder::new()
//!     .threads(4)
//!     .omit_errors(false)
//!     .create("/backups/repo", HashAlgorithm::Sha256)?;
//!
//! let summary = repo.backup(&BackupOptions::new(["/home/me/documents"]).with_name("docs"))?;
//! println!("stored {} new blobs", summary.blobs_added);
//!
//! let report = repo.check()?;
//! assert!(report.is_valid());
//! # Ok(())
//! # }
//! ```

use crate::backup::BackupRunner;
use crate::check::{CheckReport, IntegrityChecker};
use crate::error::Result;
use crate::manifest::list_manifests;
use crate::restore::RestoreRunner;
use crate::settings::{HashAlgorithm, Settings};
use crate::store::ContentStore;
use crate::types::{BackupGroup, BackupOptions, BackupSummary, RestoreResult, RunConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// An open backup repository
#[derive(Debug, Clone)]
pub struct Repository {
    store: ContentStore,
    config: RunConfig,
}

impl Repository {
    /// Create a new repository at `path` with default tuning
    ///
    /// # Errors
    ///
    /// See [`ContentStore::create`].
    pub fn create(path: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Result<Self> {
        RepositoryBuilder::new().create(path, algorithm)
    }

    /// Open an existing repository at `path` with default tuning
    ///
    /// # Errors
    ///
    /// See [`ContentStore::open`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        RepositoryBuilder::new().open(path)
    }

    /// Repository root
    pub fn path(&self) -> &Path {
        self.store.root()
    }

    /// Settings stored in the repository
    pub fn settings(&self) -> &Settings {
        self.store.settings()
    }

    /// Configuration used by every operation on this handle
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Underlying content store
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Back up files and directories into the repository
    pub fn backup(&self, options: &BackupOptions) -> Result<BackupSummary> {
        BackupRunner::new(&self.store, &self.config).run(options)
    }

    /// Restore a backup into `destination`
    ///
    /// `date` is matched as a prefix of the manifest file name, so
    /// `"2024-03-01"` picks the first snapshot of that day.
    pub fn restore(&self, name: Option<&str>, date: &str, destination: &Path) -> Result<RestoreResult> {
        RestoreRunner::new(&self.store, &self.config).run(name, date, destination)
    }

    /// Verify every stored blob against its name
    pub fn check(&self) -> Result<CheckReport> {
        IntegrityChecker::new(&self.store, &self.config).run()
    }

    /// List snapshots grouped by backup name
    pub fn list(&self) -> Result<Vec<BackupGroup>> {
        list_manifests(&self.store.backups_dir())
    }
}

/// Builder for [`Repository`] handles
///
/// Defaults: one worker per logical CPU, 4 MiB buffers, strict error policy.
#[derive(Debug, Clone)]
pub struct RepositoryBuilder {
    omit_errors: bool,
    buffer_size: usize,
    thread_count: usize,
}

impl Default for RepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        let defaults = RunConfig::default();
        Self {
            omit_errors: defaults.omit_errors,
            buffer_size: defaults.buffer_size,
            thread_count: defaults.thread_count,
        }
    }

    /// Log and skip per-item failures instead of aborting
    pub fn omit_errors(mut self, omit: bool) -> Self {
        self.omit_errors = omit;
        self
    }

    /// Read buffer size per worker (minimum 512 bytes)
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Number of worker threads
    ///
    /// Values less than 1 are automatically set to 1.
    pub fn threads(mut self, count: usize) -> Self {
        self.thread_count = count.max(1);
        self
    }

    fn config_for(&self, path: PathBuf) -> RunConfig {
        RunConfig {
            repo_path: path,
            omit_errors: self.omit_errors,
            buffer_size: self.buffer_size,
            thread_count: self.thread_count,
        }
        .normalized()
    }

    /// Initialize a new repository at `path`
    pub fn create(self, path: impl Into<PathBuf>, algorithm: HashAlgorithm) -> Result<Repository> {
        let config = self.config_for(path.into());
        let store = ContentStore::create(&config.repo_path, Settings::new(algorithm))?;
        Ok(Repository { store, config })
    }

    /// Open the repository at `path`
    pub fn open(self, path: impl Into<PathBuf>) -> Result<Repository> {
        let config = self.config_for(path.into());
        let store = ContentStore::open(&config.repo_path)?;
        info!(
            "Opened repository {:?} ({} workers, {} byte buffers)",
            config.repo_path, config.thread_count, config.buffer_size
        );
        Ok(Repository { store, config })
    }
}
