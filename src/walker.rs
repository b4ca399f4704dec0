//! Directory traversal into a [`DirEntry`] tree
//!
//! The walker turns a filesystem subtree into the tree a manifest records.
//! Children are listed in file-name order, so two walks of an unchanged tree
//! produce identical manifests.
//!
//! ## Policies
//!
//! - **Hidden entries**: with `omit_hidden`, entries the platform considers
//!   hidden are skipped entirely.
//! - **Symlinks**: skipped unless `follow_symlinks` is set, in which case the
//!   link is resolved and classified by its target. Following a link back
//!   into a directory already on the current descent path raises
//!   [`CairnError::SymlinkLoop`].
//! - **Errors**: with `omit_errors`, a child that cannot be listed, stat'ed or
//!   resolved is logged and skipped; otherwise the walk aborts.
//! - Devices, sockets, pipes and unfollowed links are silently ignored.

use crate::error::{CairnError, Result};
use crate::types::{DirEntry, FileEntry};
use crate::utils::{is_hidden, resolve_symlink};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace};
use walkdir::WalkDir;

/// Walker policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Skip hidden files and directories
    pub omit_hidden: bool,
    /// Resolve symlinks instead of skipping them
    pub follow_symlinks: bool,
    /// Log and skip failing children instead of aborting
    pub omit_errors: bool,
}

/// A classified filesystem entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A directory, fully walked
    Dir(DirEntry),
    /// A regular file, not yet hashed
    File(FileEntry),
}

/// Recursive directory walker
#[derive(Debug)]
pub struct Walker {
    options: WalkOptions,
    /// Canonical paths of the directories being descended, outermost first
    ancestors: Vec<PathBuf>,
    skipped: Vec<String>,
}

impl Walker {
    /// Create a walker with the given policies
    pub fn new(options: WalkOptions) -> Self {
        Self {
            options,
            ancestors: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Messages for every child skipped under `omit_errors`
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Take the skipped-child messages, leaving the list empty
    pub fn take_skipped(&mut self) -> Vec<String> {
        std::mem::take(&mut self.skipped)
    }

    /// Classify a top-level input path and walk it if it is a directory
    ///
    /// Hidden and symlink policies apply to the input exactly as they apply
    /// to children. Returns `None` when the policies skip the input.
    ///
    /// # Errors
    ///
    /// - [`CairnError::InputNotFound`] if nothing exists at `path`
    /// - Any error from walking the directory
    pub fn visit_input(&mut self, path: &Path) -> Result<Option<Node>> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CairnError::InputNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(CairnError::path_io("cannot get information of", path, e)),
        };
        let name = entry_name(path)?;
        self.visit(path, &name, metadata.file_type())
    }

    /// Walk the directory at `path` into a tree
    ///
    /// # Errors
    ///
    /// - [`CairnError::WalkDir`] if the directory or a child cannot be listed
    ///   (children are skipped instead under `omit_errors`)
    /// - [`CairnError::SymlinkLoop`] if a followed link re-enters an ancestor
    pub fn walk(&mut self, path: &Path) -> Result<DirEntry> {
        let name = entry_name(path)?;
        self.walk_dir(path, name)
    }

    fn walk_dir(&mut self, path: &Path, name: String) -> Result<DirEntry> {
        let guard = if self.options.follow_symlinks {
            let canonical = fs::canonicalize(path)
                .map_err(|e| CairnError::path_io("cannot resolve", path, e))?;
            if self.ancestors.contains(&canonical) {
                return Err(CairnError::SymlinkLoop(path.to_path_buf()));
            }
            self.ancestors.push(canonical);
            true
        } else {
            false
        };

        let result = self.walk_children(path, name);

        if guard {
            self.ancestors.pop();
        }
        result
    }

    fn walk_children(&mut self, path: &Path, name: String) -> Result<DirEntry> {
        trace!("Walking {:?}", path);
        let mut dir = DirEntry::new(name);

        let children = WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for child in children {
            let outcome = match child {
                // The directory itself could not be listed
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => Err(CairnError::from(e)),
                Ok(child) => {
                    let child_name = child.file_name().to_string_lossy().into_owned();
                    self.visit(child.path(), &child_name, child.file_type())
                }
            };

            match outcome {
                Ok(Some(Node::Dir(sub))) => dir.dirs.push(sub),
                Ok(Some(Node::File(file))) => dir.files.push(file),
                Ok(None) => {}
                Err(e) if self.options.omit_errors && e.is_skippable() => {
                    error!("Skipping entry in {:?}: {}", path, e);
                    self.skipped.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Walked {:?}: {} files, {} dirs",
            path,
            dir.files.len(),
            dir.dirs.len()
        );
        Ok(dir)
    }

    fn visit(&mut self, path: &Path, name: &str, file_type: fs::FileType) -> Result<Option<Node>> {
        if self.options.omit_hidden && is_hidden(path, name)? {
            trace!("Omitting hidden {:?}", path);
            return Ok(None);
        }

        let (is_dir, is_file) = if file_type.is_symlink() {
            if !self.options.follow_symlinks {
                trace!("Not following symlink {:?}", path);
                return Ok(None);
            }
            let target = resolve_symlink(path)?;
            (target.is_dir(), target.is_file())
        } else {
            (file_type.is_dir(), file_type.is_file())
        };

        if is_dir {
            Ok(Some(Node::Dir(self.walk_dir(path, name.to_string())?)))
        } else if is_file {
            let mut entry = FileEntry::from_path(path)?;
            entry.name = name.to_string();
            Ok(Some(Node::File(entry)))
        } else {
            trace!("Ignoring special file {:?}", path);
            Ok(None)
        }
    }
}

/// Name recorded for a path: its last component, or the last component of
/// its canonical form for paths like `.`
fn entry_name(path: &Path) -> Result<String> {
    if let Some(name) = path.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    let canonical =
        fs::canonicalize(path).map_err(|e| CairnError::path_io("cannot resolve", path, e))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CairnError::internal(format!("cannot name the root path {:?}", path)))
}
