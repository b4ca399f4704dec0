//! Error types for the Cairn library
//!
//! This module defines all error types that can occur during Cairn operations.
//! Errors carry the offending path whenever one exists, so a failure reported
//! to the user always says *which* file or directory was involved.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the Cairn library
pub type Result<T> = std::result::Result<T, CairnError>;

/// Main error type for all Cairn operations
#[derive(Debug, Error)]
pub enum CairnError {
    /// I/O errors without a more specific context
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors tied to a specific path
    #[error("{action} {path:?}: {source}")]
    PathIo {
        /// What was being attempted (e.g. "cannot open file")
        action: &'static str,
        /// Path involved in the failed operation
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Settings file exists but is not valid settings TOML
    #[error("Malformed settings {path:?}: {reason}")]
    MalformedSettings {
        /// Settings path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Errors while writing TOML settings
    #[error("TOML write error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// The configured hash algorithm is not supported
    #[error("Hash algorithm {0} is not supported")]
    UnsupportedAlgorithm(String),

    /// Input path given to a backup does not exist
    #[error("Input path not found: {0:?}")]
    InputNotFound(PathBuf),

    /// Repository target directory exists and is not empty
    #[error("Repository path is not empty: {0:?}")]
    RepositoryNotEmpty(PathBuf),

    /// Repository target path exists but is not a directory
    #[error("Repository path is not a directory: {0:?}")]
    NotADirectory(PathBuf),

    /// No repository found at the path
    #[error("Repository not initialized at path: {0:?}")]
    RepositoryNotInitialized(PathBuf),

    /// Settings or manifest was written by an incompatible format version
    #[error("Incompatible format version {found} (supported up to {supported})")]
    IncompatibleVersion {
        /// Version found on disk
        found: String,
        /// Newest version this build understands
        supported: String,
    },

    /// Invalid format version string
    #[error("Invalid format version: {0}")]
    InvalidVersion(String),

    /// Manifest file exists but cannot be accepted
    #[error("Malformed manifest {path:?}: {reason}")]
    MalformedManifest {
        /// Manifest path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// Two entries of one directory level would share a name
    #[error("Duplicate entry name {0:?}")]
    DuplicateName(String),

    /// Backup name cannot be used as a directory under `backups/`
    #[error("Invalid backup name: {0:?}")]
    InvalidBackupName(String),

    /// No manifest matched the requested name/date
    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    /// Blob file name does not follow `<hex-hash>-<size>`
    #[error("Name of file {0:?} is corrupted")]
    MalformedBlobName(PathBuf),

    /// Blob size differs from the size encoded in its name
    #[error("Sizes don't match in file {path:?} (name says {expected}, found {actual})")]
    SizeMismatch {
        /// Blob path
        path: PathBuf,
        /// Size encoded in the name
        expected: u64,
        /// Size on disk
        actual: u64,
    },

    /// Blob content hash differs from the hash encoded in its name
    #[error("Hashes don't match in file {path:?} (name says {expected}, found {actual})")]
    HashMismatch {
        /// Blob path
        path: PathBuf,
        /// Hex hash encoded in the name
        expected: String,
        /// Hex hash of the current bytes
        actual: String,
    },

    /// A failed copy left a partial file that could not be removed
    #[error("Corrupt file left at {path:?}, remove it manually: {reason}")]
    CorruptFileLeft {
        /// Path of the leftover partial file
        path: PathBuf,
        /// The copy error that started the cleanup
        reason: String,
    },

    /// A file entry reached the hasher without a source path
    #[error("Undefined source path in file with name {0:?}")]
    MissingSourcePath(String),

    /// A file entry reached the store before it was hashed
    #[error("File {0:?} has not been hashed")]
    MissingHash(PathBuf),

    /// Following a symlink would re-enter a directory already being walked
    #[error("Symlink loop detected at {0:?}")]
    SymlinkLoop(PathBuf),

    /// Restore destination entry already exists
    #[error("Restore target already exists: {0:?}")]
    RestoreTargetExists(PathBuf),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CairnError {
    /// Wrap an I/O error with the action and path it belongs to
    pub fn path_io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CairnError::PathIo {
            action,
            path: path.into(),
            source,
        }
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        CairnError::Internal(msg.into())
    }

    /// Check if this error is an integrity failure found while checking blobs
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            CairnError::MalformedBlobName(_)
                | CairnError::SizeMismatch { .. }
                | CairnError::HashMismatch { .. }
        )
    }

    /// Check if the omit-errors policy may skip the item this error belongs to
    ///
    /// Configuration errors always abort the run.
    pub fn is_skippable(&self) -> bool {
        !matches!(
            self,
            CairnError::UnsupportedAlgorithm(_)
                | CairnError::MalformedSettings { .. }
                | CairnError::RepositoryNotInitialized(_)
                | CairnError::IncompatibleVersion { .. }
                | CairnError::InvalidBackupName(_)
                | CairnError::ThreadPool(_)
                | CairnError::Internal(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            CairnError::RepositoryNotInitialized(path) => {
                format!("No repository at {:?}. Run 'cairn init' first.", path)
            }
            CairnError::RepositoryNotEmpty(path) => {
                format!("{:?} is not empty. Choose an empty or missing directory for a new repository.", path)
            }
            CairnError::UnsupportedAlgorithm(name) => {
                format!(
                    "Hash algorithm '{}' is not supported. Use one of: md5, sha1, sha256, sha512, sha3-256, sha3-512.",
                    name
                )
            }
            CairnError::BackupNotFound(what) => {
                format!("No backup matches {}. Use 'cairn list' to see available backups.", what)
            }
            _ => self.to_string(),
        }
    }
}
