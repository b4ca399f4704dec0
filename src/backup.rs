//! Backup orchestration
//!
//! A backup runs in fixed stages:
//!
//! 1. **Walk inputs** - each input path is classified and, for directories,
//!    walked into a tree
//! 2. **Hash** - every discovered file is hashed by the [`HasherPool`]; digests
//!    are written straight into the tree
//! 3. **Copy into store** - each file is added to the [`ContentStore`] in
//!    parallel; content already stored is not copied again
//! 4. **Write manifest** - the tree is saved as
//!    `backups/[<name>/]YYYY-MM-DD_hh-mm-ss.json`, named after the start time
//!
//! With `omit_errors` off, the first failure aborts the run and no manifest is
//! written. With it on, failing inputs and files are logged and left out, and
//! the manifest only lists files whose content made it into the store.

use crate::error::{CairnError, Result};
use crate::manifest::{manifest_dir, manifest_file_name, write_manifest, Manifest};
use crate::pool::{ErrorCollector, HasherPool};
use crate::store::{AddOutcome, ContentStore};
use crate::types::{BackupOptions, BackupSummary, FileEntry, RunConfig};
use crate::walker::{Node, WalkOptions, Walker};
use chrono::Local;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Counters gathered while copying into the store
#[derive(Debug, Default)]
struct CopyTally {
    added: usize,
    existing: usize,
    bytes: u64,
}

/// Runs one backup against an open repository
pub struct BackupRunner<'a> {
    store: &'a ContentStore,
    config: &'a RunConfig,
}

impl<'a> BackupRunner<'a> {
    /// Create a runner for `store` with the given run configuration
    pub fn new(store: &'a ContentStore, config: &'a RunConfig) -> Self {
        Self { store, config }
    }

    /// Back up `options.paths` and write the manifest
    ///
    /// # Errors
    ///
    /// - [`CairnError::InvalidBackupName`] if the name is not a plain path component
    /// - [`CairnError::InputNotFound`] if an input path does not exist
    /// - Any walk, hash, copy or write error, unless skipped under `omit_errors`
    #[instrument(skip(self, options), fields(inputs = options.paths.len(), name = ?options.name))]
    pub fn run(&self, options: &BackupOptions) -> Result<BackupSummary> {
        let timer = Instant::now();
        let started_at = Local::now().naive_local();
        let target_dir = manifest_dir(&self.store.backups_dir(), options.name.as_deref())?;

        info!("Listing files");
        let mut skipped = Vec::new();
        let mut manifest = self.walk_inputs(options, &mut skipped)?;
        let files_found = manifest.file_count();

        info!("Hashing {} files", files_found);
        let mut pool = HasherPool::new(
            self.store.settings().hash_algorithm,
            self.config.buffer_size,
            self.config.thread_count,
        );
        let outcome = pool.hash_files(manifest.all_files_mut(), self.config.omit_errors)?;
        skipped.extend(outcome.skipped.iter().map(ToString::to_string));
        let unhashed = manifest.retain_files(FileEntry::is_hashed);
        if unhashed > 0 {
            debug!("Left {} unreadable files out of the manifest", unhashed);
        }

        info!("Copying files into the repository");
        let (tally, failed) = self.copy_into_store(&manifest)?;
        if !failed.is_empty() {
            manifest.retain_files(|f| {
                f.source_path
                    .as_ref()
                    .map_or(true, |p| !failed.contains(p))
            });
        }
        skipped.extend(failed.iter().map(|p| format!("cannot store {:?}", p)));

        let manifest_path = target_dir.join(manifest_file_name(&started_at));
        info!("Saving backup info in {:?}", manifest_path);
        write_manifest(&manifest_path, &manifest)?;

        let summary = BackupSummary {
            manifest_path,
            files_found,
            files_hashed: outcome.hashed,
            blobs_added: tally.added,
            blobs_existing: tally.existing,
            bytes_added: tally.bytes,
            skipped,
            duration_ms: timer.elapsed().as_millis() as u64,
        };
        info!(
            "Backup finished: {} files, {} new blobs, {} already stored",
            summary.files_found, summary.blobs_added, summary.blobs_existing
        );
        Ok(summary)
    }

    /// Classify and walk every input into one manifest
    fn walk_inputs(&self, options: &BackupOptions, skipped: &mut Vec<String>) -> Result<Manifest> {
        let mut walker = Walker::new(WalkOptions {
            omit_hidden: options.omit_hidden,
            follow_symlinks: options.follow_symlinks,
            omit_errors: self.config.omit_errors,
        });
        let mut manifest = Manifest::new();
        let mut root_names = HashSet::new();

        for path in &options.paths {
            let visited = walker.visit_input(path).and_then(|node| match node {
                Some(node) => {
                    let name = match &node {
                        Node::Dir(d) => d.name.clone(),
                        Node::File(f) => f.name.clone(),
                    };
                    if root_names.insert(name.clone()) {
                        Ok(Some(node))
                    } else {
                        Err(CairnError::DuplicateName(name))
                    }
                }
                None => Ok(None),
            });

            match visited {
                Ok(Some(Node::Dir(dir))) => {
                    debug!("Listed directory {:?} ({} files)", path, dir.file_count());
                    manifest.dirs.push(dir);
                }
                Ok(Some(Node::File(file))) => manifest.files.push(file),
                Ok(None) => info!("Input {:?} omitted by policy", path),
                Err(e) if self.config.omit_errors && e.is_skippable() => {
                    error!("Skipping input {:?}: {}", path, e);
                    skipped.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        skipped.extend(walker.take_skipped());
        Ok(manifest)
    }

    /// Add every file to the content store on a pool of `thread_count` workers
    ///
    /// Returns the tally and the source paths that were skipped.
    fn copy_into_store(&self, manifest: &Manifest) -> Result<(CopyTally, HashSet<PathBuf>)> {
        let files = manifest.all_files();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.thread_count.max(1))
            .build()
            .map_err(|e| CairnError::ThreadPool(e.to_string()))?;

        let tally = Mutex::new(CopyTally::default());
        let errors = ErrorCollector::new();
        let failed = Mutex::new(HashSet::new());
        let buffer_size = self.config.buffer_size;
        let omit_errors = self.config.omit_errors;

        thread_pool.install(|| {
            files.par_iter().try_for_each_init(
                || vec![0u8; buffer_size],
                |buffer, file| -> Result<()> {
                    match self.add_file(file, buffer) {
                        Ok(AddOutcome::Added(bytes)) => {
                            let mut t = tally.lock();
                            t.added += 1;
                            t.bytes += bytes;
                        }
                        Ok(AddOutcome::AlreadyPresent) => tally.lock().existing += 1,
                        Err(e) if omit_errors && e.is_skippable() => {
                            error!("{}", e);
                            failed.lock().insert(file.display_path());
                            errors.push(e);
                        }
                        Err(e) => return Err(e),
                    }
                    Ok(())
                },
            )
        })?;

        debug!("{} files could not be stored", errors.len());
        Ok((tally.into_inner(), failed.into_inner()))
    }

    fn add_file(&self, file: &FileEntry, buffer: &mut [u8]) -> Result<AddOutcome> {
        let source = file
            .source_path
            .as_deref()
            .ok_or_else(|| CairnError::MissingSourcePath(file.name.clone()))?;
        self.store.add(source, &file.hash, file.size, buffer)
    }
}
