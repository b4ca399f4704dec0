//! Restore orchestration
//!
//! Restoring reads one manifest and recreates its tree under a destination
//! directory, copying each file's content out of the store by its address.
//!
//! The destination is expected to be empty: it is created if missing, and a
//! subdirectory that already exists is an error. With `omit_errors`, a file
//! that cannot be copied or a directory that cannot be created is logged and
//! skipped, but an error while restoring *inside* a subdirectory always
//! aborts the run so a missing subtree cannot go unnoticed.

use crate::error::{CairnError, Result};
use crate::manifest::{find_manifest, read_manifest};
use crate::store::ContentStore;
use crate::types::{DirEntry, FileEntry, RestoreResult, RunConfig};
use crate::utils::copy_with_buffer;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Runs one restore from an open repository
pub struct RestoreRunner<'a> {
    store: &'a ContentStore,
    config: &'a RunConfig,
}

impl<'a> RestoreRunner<'a> {
    /// Create a runner for `store` with the given run configuration
    pub fn new(store: &'a ContentStore, config: &'a RunConfig) -> Self {
        Self { store, config }
    }

    /// Restore the backup named `name` whose file name starts with `date`
    /// into `destination`
    ///
    /// # Errors
    ///
    /// - [`CairnError::BackupNotFound`] if no manifest matches
    /// - [`CairnError::MalformedManifest`] if the manifest is invalid
    /// - [`CairnError::RestoreTargetExists`] if a directory already exists
    ///   (skipped under `omit_errors`)
    /// - Any I/O error while copying, unless skipped under `omit_errors`
    #[instrument(skip(self, destination), fields(destination = ?destination))]
    pub fn run(&self, name: Option<&str>, date: &str, destination: &Path) -> Result<RestoreResult> {
        let timer = Instant::now();
        let manifest_path = find_manifest(&self.store.backups_dir(), name, date)?;
        info!("Restoring {:?} into {:?}", manifest_path, destination);
        let manifest = read_manifest(&manifest_path)?;

        fs::create_dir_all(destination)
            .map_err(|e| CairnError::path_io("error creating directory", destination, e))?;

        let mut result = RestoreResult {
            manifest_path,
            ..Default::default()
        };
        let mut buffer = vec![0u8; self.config.buffer_size];
        self.restore_level(&manifest.dirs, &manifest.files, destination, &mut buffer, &mut result)?;

        result.duration_ms = timer.elapsed().as_millis() as u64;
        info!(
            "Restore finished: {} files, {} directories",
            result.files_restored, result.dirs_created
        );
        Ok(result)
    }

    fn restore_level(
        &self,
        dirs: &[DirEntry],
        files: &[FileEntry],
        target: &Path,
        buffer: &mut [u8],
        result: &mut RestoreResult,
    ) -> Result<()> {
        for file in files {
            let dest = target.join(&file.name);
            match self.restore_file(file, &dest, buffer) {
                Ok(bytes) => {
                    result.files_restored += 1;
                    result.bytes_written += bytes;
                }
                Err(e) if self.config.omit_errors && e.is_skippable() => {
                    error!("Error restoring file {:?}: {}", dest, e);
                    result.warnings.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        for dir in dirs {
            let dest = target.join(&dir.name);
            match create_new_dir(&dest) {
                Ok(()) => result.dirs_created += 1,
                Err(e) if self.config.omit_errors && e.is_skippable() => {
                    error!("Error restoring folder {:?}: {}", dest, e);
                    result.warnings.push(e.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            }
            self.restore_level(&dir.dirs, &dir.files, &dest, buffer, result)?;
        }
        Ok(())
    }

    /// Copy one blob out of the store; the destination file must not exist
    fn restore_file(&self, file: &FileEntry, dest: &Path, buffer: &mut [u8]) -> Result<u64> {
        let blob = self.store.compute_path(&file.hash, file.size);
        let mut reader =
            File::open(&blob).map_err(|e| CairnError::path_io("cannot open blob", &blob, e))?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => CairnError::RestoreTargetExists(dest.to_path_buf()),
                _ => CairnError::path_io("cannot create file", dest, e),
            })?;
        let copied = match copy_with_buffer(&mut reader, &mut writer, buffer) {
            Ok(copied) => copied,
            Err(err) => {
                drop(writer);
                return Err(discard_partial(dest, err));
            }
        };
        debug!("Restored {:?} ({} bytes)", dest, copied);
        Ok(copied)
    }
}

/// Remove a file whose copy failed part way
///
/// Gives the copy error back, or [`CairnError::CorruptFileLeft`] if the
/// partial file could not be removed.
fn discard_partial(dest: &Path, err: io::Error) -> CairnError {
    match fs::remove_file(dest) {
        Ok(()) => CairnError::path_io("error copying file", dest, err),
        Err(cleanup) => {
            error!(
                critical = true,
                "Corrupt file left at {:?}, remove it manually: {} (cleanup failed: {})",
                dest, err, cleanup
            );
            CairnError::CorruptFileLeft {
                path: dest.to_path_buf(),
                reason: err.to_string(),
            }
        }
    }
}

fn create_new_dir(path: &Path) -> Result<()> {
    fs::create_dir(path).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => CairnError::RestoreTargetExists(path.to_path_buf()),
        _ => CairnError::path_io("error creating directory", path, e),
    })
}
