//! Core data types used throughout the Cairn library
//!
//! This module contains the data model shared by the walker, the hasher pool,
//! the manifest and the orchestrators.
//!
//! ## Overview
//!
//! - **File System State**: [`FileEntry`], [`DirEntry`] - the tree a backup records
//! - **Configuration**: [`RunConfig`], [`BackupOptions`] - explicit run parameters
//! - **Results**: [`BackupSummary`], [`RestoreResult`], [`BackupGroup`]
//!
//! ## Examples
//!
//! ```rust
//! use cairn::types::{DirEntry, FileEntry};
//!
//! let mut dir = DirEntry::new("photos");
//! dir.files.push(FileEntry {
//!     name: "cat.jpg".to_string(),
//!     size: 2048,
//!     hash: vec![0xab; 32],
//!     source_path: None,
//! });
//! assert_eq!(dir.file_count(), 1);
//! assert_eq!(dir.total_size(), 2048);
//! ```

use crate::error::{CairnError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default copy/hash buffer size per worker (4 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Smallest buffer size accepted by [`RunConfig`]
pub const MIN_BUFFER_SIZE: usize = 512;

/// A regular file recorded in a backup
///
/// Identity is `(hash, size)`. `source_path` only lives for the duration of a
/// backup run and is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    /// File name (no directory components)
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Content digest; empty until the hasher fills it in
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
    /// Where the original bytes live during a backup run
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl FileEntry {
    /// Describe the file at `path` without hashing it
    ///
    /// Follows symlinks, so a resolved symlink is described by its target's
    /// size while keeping the link's own name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)
            .map_err(|e| CairnError::path_io("cannot get information of", path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CairnError::internal(format!("path {:?} has no file name", path)))?;

        Ok(Self {
            name,
            size: metadata.len(),
            hash: Vec::new(),
            source_path: Some(path.to_path_buf()),
        })
    }

    /// Whether the hasher already filled in the digest
    pub fn is_hashed(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Digest as lowercase hex
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    /// Path used in log and error messages
    pub fn display_path(&self) -> PathBuf {
        self.source_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.name))
    }
}

/// A directory recorded in a backup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DirEntry {
    /// Directory name (no parent components)
    pub name: String,
    /// Child directories, in listing order
    pub dirs: Vec<DirEntry>,
    /// Child files, in listing order
    pub files: Vec<FileEntry>,
}

impl DirEntry {
    /// Create an empty directory entry
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dirs: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Number of files in this subtree
    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.iter().map(DirEntry::file_count).sum::<usize>()
    }

    /// Number of directories below this one
    pub fn dir_count(&self) -> usize {
        self.dirs.len() + self.dirs.iter().map(DirEntry::dir_count).sum::<usize>()
    }

    /// Total bytes of all files in this subtree
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum::<u64>()
            + self.dirs.iter().map(DirEntry::total_size).sum::<u64>()
    }

    /// Push shared references to every file in this subtree into `out`
    pub fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileEntry>) {
        for dir in &self.dirs {
            dir.collect_files(out);
        }
        out.extend(self.files.iter());
    }

    /// Push exclusive references to every file in this subtree into `out`
    ///
    /// The hasher pool writes digests through these references, so results
    /// land on the tree itself rather than on a positional copy.
    pub fn collect_files_mut<'a>(&'a mut self, out: &mut Vec<&'a mut FileEntry>) {
        for dir in &mut self.dirs {
            dir.collect_files_mut(out);
        }
        out.extend(self.files.iter_mut());
    }

    /// Drop every file in this subtree for which `keep` returns false
    ///
    /// Returns the number of files removed.
    pub fn retain_files<F>(&mut self, keep: &mut F) -> usize
    where
        F: FnMut(&FileEntry) -> bool,
    {
        let before = self.files.len();
        self.files.retain(|f| keep(f));
        let mut removed = before - self.files.len();
        for dir in &mut self.dirs {
            removed += dir.retain_files(keep);
        }
        removed
    }
}

/// Explicit configuration for one repository operation
///
/// Built once (usually by [`crate::RepositoryBuilder`]) and passed by
/// reference to every component. Nothing in the crate reads configuration
/// from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Repository root directory
    pub repo_path: PathBuf,
    /// Log and skip per-item failures instead of aborting
    pub omit_errors: bool,
    /// Read buffer size per worker, in bytes
    pub buffer_size: usize,
    /// Number of worker threads for hashing, copying and checking
    pub thread_count: usize,
}

impl RunConfig {
    /// Configuration with default tuning for the repository at `repo_path`
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            ..Self::default()
        }
    }

    /// Apply the lower bounds for buffer size and thread count
    pub fn normalized(mut self) -> Self {
        self.buffer_size = self.buffer_size.max(MIN_BUFFER_SIZE);
        self.thread_count = self.thread_count.max(1);
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            omit_errors: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            thread_count: num_cpus::get(),
        }
    }
}

/// Parameters of one backup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOptions {
    /// Files and directories to back up
    pub paths: Vec<PathBuf>,
    /// Optional backup name; the manifest is stored under `backups/<name>/`
    pub name: Option<String>,
    /// Skip hidden files and directories
    pub omit_hidden: bool,
    /// Resolve symlinks instead of skipping them
    pub follow_symlinks: bool,
}

impl BackupOptions {
    /// Options backing up `paths` with default policies
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Store the manifest under a named group
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set hidden-file policy
    pub fn with_omit_hidden(mut self, omit: bool) -> Self {
        self.omit_hidden = omit;
        self
    }

    /// Set symlink policy
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

/// Result of a backup run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupSummary {
    /// Where the manifest was written
    pub manifest_path: PathBuf,
    /// Regular files discovered while walking
    pub files_found: usize,
    /// Files that were hashed successfully
    pub files_hashed: usize,
    /// New blobs copied into the content store
    pub blobs_added: usize,
    /// Files whose content was already stored
    pub blobs_existing: usize,
    /// Bytes copied into the content store
    pub bytes_added: u64,
    /// Items skipped under the omit-errors policy
    pub skipped: Vec<String>,
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
}

/// Result of a restore run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Manifest the restore was read from
    pub manifest_path: PathBuf,
    /// Files written to the destination
    pub files_restored: usize,
    /// Directories created under the destination
    pub dirs_created: usize,
    /// Total bytes written
    pub bytes_written: u64,
    /// Items skipped under the omit-errors policy
    pub warnings: Vec<String>,
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
}

/// Snapshots stored under one backup name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupGroup {
    /// Backup name; `None` for snapshots stored directly under `backups/`
    pub name: Option<String>,
    /// Snapshot start times, ascending
    pub snapshots: Vec<NaiveDateTime>,
}

/// Serde adapter storing byte vectors as lowercase hex strings
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
