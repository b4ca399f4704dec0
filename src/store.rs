//! Content-addressed blob store
//!
//! Every unique file content is stored exactly once, at a path derived only
//! from its digest and size.
//!
//! ## Architecture
//!
//! ```text
//! repo/
//! ├── settings.toml          # Format version and hash algorithm
//! ├── backups/               # Snapshot manifests (see `manifest`)
//! └── files/                 # Blobs, fanned out over 256 buckets
//!     ├── 00/
//!     │   └── 00a1…e9-1024   # <hex digest>-<decimal size>
//!     ├── …
//!     └── ff/
//! ```
//!
//! ## Invariants
//!
//! - A blob present at `files/<hh>/<hash>-<size>` has exactly that digest and
//!   size. The [`crate::check`] pass verifies this.
//! - Blobs are never rewritten. An existing blob is assumed correct.
//! - New blobs are copied into a temporary file directly under `files/` and
//!   published with a rename, so a bucket never holds a partial blob.
//!
//! Concurrent `add` calls for the same new content may both copy it; the
//! rename is atomic and either copy is correct, so the race only costs time.

use crate::error::{CairnError, Result};
use crate::settings::{read_settings, write_settings, Settings, SETTINGS_FILE};
use crate::utils::copy_with_buffer;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

/// Directory holding manifests
pub const BACKUPS_DIR: &str = "backups";

/// Directory holding blob buckets
pub const FILES_DIR: &str = "files";

/// What [`ContentStore::add`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new blob was written, with this many bytes
    Added(u64),
    /// A blob with this digest and size already existed
    AlreadyPresent,
}

/// Handle to the on-disk repository layout
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    settings: Settings,
}

impl ContentStore {
    /// Create a new repository layout at `root`
    ///
    /// `root` must not exist or must be an empty directory. Creates
    /// `backups/`, `files/00` through `files/ff` and writes `settings.toml`.
    ///
    /// # Errors
    ///
    /// - [`CairnError::NotADirectory`] if `root` exists and is not a directory
    /// - [`CairnError::RepositoryNotEmpty`] if `root` has any entries
    /// - [`CairnError::PathIo`] if a directory cannot be created
    pub fn create(root: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        let root = root.into();
        info!("Creating repository in {:?}", root);

        match fs::metadata(&root) {
            Ok(meta) if !meta.is_dir() => return Err(CairnError::NotADirectory(root)),
            Ok(_) => {
                let mut entries = fs::read_dir(&root)
                    .map_err(|e| CairnError::path_io("error listing", &root, e))?;
                if entries.next().is_some() {
                    return Err(CairnError::RepositoryNotEmpty(root));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Creating repository folder");
                fs::create_dir_all(&root)
                    .map_err(|e| CairnError::path_io("error creating directory", &root, e))?;
            }
            Err(e) => return Err(CairnError::path_io("error getting stats from", &root, e)),
        }

        let backups = root.join(BACKUPS_DIR);
        fs::create_dir(&backups)
            .map_err(|e| CairnError::path_io("error creating subdirectory", &backups, e))?;

        let files = root.join(FILES_DIR);
        fs::create_dir(&files)
            .map_err(|e| CairnError::path_io("error creating subdirectory", &files, e))?;
        for bucket in 0..=0xffu8 {
            let path = files.join(format!("{:02x}", bucket));
            trace!("Creating bucket {:?}", path);
            fs::create_dir(&path)
                .map_err(|e| CairnError::path_io("error creating subdirectory", &path, e))?;
        }

        write_settings(&root.join(SETTINGS_FILE), &settings)?;
        info!(
            "Initialized repository at {:?} using {}",
            root, settings.hash_algorithm
        );
        Ok(Self { root, settings })
    }

    /// Open an existing repository layout and load its settings
    ///
    /// # Errors
    ///
    /// - [`CairnError::RepositoryNotInitialized`] if the settings file or the
    ///   `files/` directory is missing
    /// - Any error from [`read_settings`]
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let settings_path = root.join(SETTINGS_FILE);
        if !settings_path.is_file() || !root.join(FILES_DIR).is_dir() {
            return Err(CairnError::RepositoryNotInitialized(root));
        }
        let settings = read_settings(&settings_path)?;
        debug!("Opened repository at {:?}", root);
        Ok(Self { root, settings })
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings loaded at open/create time
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Directory holding manifests
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    /// Directory holding blob buckets
    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    /// Blob path for a digest and size
    ///
    /// Pure function of its arguments: same content, same path.
    pub fn compute_path(&self, hash: &[u8], size: u64) -> PathBuf {
        blob_path(&self.files_dir(), hash, size)
    }

    /// Whether a blob for this digest and size exists
    pub fn contains(&self, hash: &[u8], size: u64) -> Result<bool> {
        let path = self.compute_path(hash, size);
        match fs::symlink_metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CairnError::path_io("cannot get information of", path, e)),
        }
    }

    /// Store the bytes at `source` under `(hash, size)` unless already present
    ///
    /// Bytes are copied through `buffer` into a temporary file and published
    /// with an atomic rename only after the whole copy succeeded.
    ///
    /// # Errors
    ///
    /// - [`CairnError::PathIo`] if the source cannot be read or the blob
    ///   cannot be written
    /// - [`CairnError::SizeMismatch`] if the source no longer has `size` bytes
    /// - [`CairnError::CorruptFileLeft`] if a failed copy could not be cleaned
    ///   up; the partial file's path is in the error
    pub fn add(&self, source: &Path, hash: &[u8], size: u64, buffer: &mut [u8]) -> Result<AddOutcome> {
        if hash.is_empty() {
            return Err(CairnError::MissingHash(source.to_path_buf()));
        }
        if self.contains(hash, size)? {
            trace!("Blob {}-{} already stored", hex::encode(hash), size);
            return Ok(AddOutcome::AlreadyPresent);
        }

        let destination = self.compute_path(hash, size);
        let files_dir = self.files_dir();
        let mut temp = tempfile::NamedTempFile::new_in(&files_dir)
            .map_err(|e| CairnError::path_io("cannot create temporary file in", &files_dir, e))?;

        let copied = copy_source(source, temp.as_file_mut(), size, buffer);

        let copied = match copied {
            Ok(copied) => copied,
            Err(err) => {
                let temp_path = temp.path().to_path_buf();
                return match temp.close() {
                    Ok(()) => Err(err),
                    Err(cleanup) => {
                        error!(
                            critical = true,
                            "Corrupt file left at {:?}, remove it manually: {} (cleanup failed: {})",
                            temp_path, err, cleanup
                        );
                        Err(CairnError::CorruptFileLeft {
                            path: temp_path,
                            reason: err.to_string(),
                        })
                    }
                };
            }
        };

        temp.persist(&destination)
            .map_err(|e| CairnError::path_io("cannot publish blob", &destination, e.error))?;
        debug!("Stored blob {:?} ({} bytes)", destination, copied);
        Ok(AddOutcome::Added(copied))
    }

    /// Every regular file in the 256 buckets, sorted by path
    ///
    /// Missing buckets are logged and skipped; anything that is not a regular
    /// file is ignored.
    pub fn list_blobs(&self) -> Result<Vec<PathBuf>> {
        let files_dir = self.files_dir();
        let mut blobs = Vec::new();

        for bucket in 0..=0xffu8 {
            let bucket_dir = files_dir.join(format!("{:02x}", bucket));
            let entries = match fs::read_dir(&bucket_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("Bucket {:?} is missing", bucket_dir);
                    continue;
                }
                Err(e) => return Err(CairnError::path_io("error listing", &bucket_dir, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| CairnError::path_io("error listing", &bucket_dir, e))?;
                let file_type = entry
                    .file_type()
                    .map_err(|e| CairnError::path_io("cannot get information of", entry.path(), e))?;
                if file_type.is_file() {
                    blobs.push(entry.path());
                }
            }
        }

        blobs.sort();
        Ok(blobs)
    }
}

/// Copy `source` into `dest`, requiring exactly `size` bytes
fn copy_source(source: &Path, dest: &mut File, size: u64, buffer: &mut [u8]) -> Result<u64> {
    let mut reader =
        File::open(source).map_err(|e| CairnError::path_io("cannot open file", source, e))?;
    let copied = copy_with_buffer(&mut reader, dest, buffer)
        .map_err(|e| CairnError::path_io("error copying file", source, e))?;
    if copied != size {
        return Err(CairnError::SizeMismatch {
            path: source.to_path_buf(),
            expected: size,
            actual: copied,
        });
    }
    dest.sync_all()
        .map_err(|e| CairnError::path_io("cannot sync copy of", source, e))?;
    Ok(copied)
}

/// `files_dir/<first byte hex>/<hex digest>-<size>`
pub fn blob_path(files_dir: &Path, hash: &[u8], size: u64) -> PathBuf {
    let hex_hash = hex::encode(hash);
    let bucket = hex_hash.get(..2).unwrap_or("00");
    files_dir.join(bucket).join(format!("{}-{}", hex_hash, size))
}
