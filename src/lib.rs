//! # Cairn - Deduplicating backups in a content-addressed repository
//!
//! A backup engine that stores every unique file content exactly once and
//! records each backup run as a lightweight manifest referencing that content.
//!
//! ## Overview
//!
//! Cairn lets you:
//! - Initialize a local repository with a chosen hash algorithm
//! - Back up any set of files and directories, optionally under a name
//! - Restore any backup by name and date into an empty directory
//! - Verify that every stored blob still matches its own digest and size
//! - List all snapshots grouped by backup name
//!
//! ## Architecture
//!
//! - **Content Store**: blobs live at `files/<hh>/<hex digest>-<size>`, fanned
//!   out over 256 buckets; identical content maps to the same path
//! - **Hasher Pool**: a fixed set of workers, each owning its own buffer and
//!   digest state, pulling files from a shared queue
//! - **Directory Walker**: turns a directory into a sorted tree, applying the
//!   hidden-file and symlink policies
//! - **Manifests**: one JSON file per backup run under `backups/`, named after
//!   the moment the run started
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cairn::{BackupOptions, HashAlgorithm, Repository};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a repository
//! let repo = Repository::create("./repo", HashAlgorithm::Sha256)?;
//!
//! // Back up a directory
//! let summary = repo.backup(&BackupOptions::new(["./documents"]))?;
//! println!("Wrote {:?}", summary.manifest_path);
//!
//! // Restore the first backup of a given day
//! let result = repo.restore(None, "2024-03-01", Path::new("./restored"))?;
//! println!("Restored {} files", result.files_restored);
//!
//! // Verify every stored blob
//! let report = repo.check()?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, CairnError>`. Errors carry the path they
//! concern. With `omit_errors` enabled, failures tied to a single file or
//! directory are logged and skipped; configuration errors always abort.
//!
//! ## Module Organization
//!
//! - [`repository`]: user-level operations and the builder
//! - [`backup`], [`restore`], [`check`]: the orchestrators
//! - [`store`]: content-addressed blob storage
//! - [`hasher`], [`pool`]: digest computation and the worker pool
//! - [`walker`]: directory traversal
//! - [`manifest`]: snapshot manifests
//! - [`settings`]: repository settings and format versioning
//! - [`types`]: common data structures
//! - [`error`]: error types

pub mod backup;
pub mod check;
pub mod error;
pub mod hasher;
pub mod manifest;
pub mod pool;
pub mod repository;
pub mod restore;
pub mod settings;
pub mod store;
pub mod types;
pub mod utils;
pub mod walker;

// Re-export main types for convenience
pub use check::{CheckReport, IntegrityIssue, IssueKind};
pub use error::{CairnError, Result};
pub use manifest::Manifest;
pub use repository::{Repository, RepositoryBuilder};
pub use settings::{FormatVersion, HashAlgorithm, Settings, FORMAT_VERSION};
pub use store::ContentStore;
pub use types::*;
