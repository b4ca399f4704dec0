//! Snapshot manifests
//!
//! A manifest records one backup run: the directory tree that was backed up,
//! with every file's size and digest. Manifests are JSON files stored under
//! `backups/`, optionally one level down under a backup name:
//!
//! ```text
//! backups/
//! ├── 2024-03-01_09-30-00.json          # unnamed backup
//! └── photos/
//!     └── 2024-03-02_18-05-12.json      # backup named "photos"
//! ```
//!
//! ```json
//! {"version":"1.0.0","dirs":[{"name":"docs","dirs":[],"files":[...]}],
//!  "files":[{"name":"a.txt","size":3,"hash":"ba7816bf..."}]}
//! ```
//!
//! A manifest is immutable once written. Reading one validates it fully; a
//! malformed manifest is rejected, never partially accepted.

use crate::error::{CairnError, Result};
use crate::settings::{FormatVersion, FORMAT_VERSION};
use crate::types::{BackupGroup, DirEntry, FileEntry};
use crate::utils::atomic_write;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// `strftime` layout of manifest file stems
const NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Manifest file extension
const EXTENSION: &str = "json";

/// One backup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Format version the manifest was written with
    pub version: String,
    /// Directories given as backup inputs
    pub dirs: Vec<DirEntry>,
    /// Regular files given as backup inputs
    pub files: Vec<FileEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Empty manifest at the current format version
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            dirs: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Number of files in the whole manifest
    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.iter().map(DirEntry::file_count).sum::<usize>()
    }

    /// Total bytes of all files
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum::<u64>()
            + self.dirs.iter().map(DirEntry::total_size).sum::<u64>()
    }

    /// Shared references to every file
    pub fn all_files(&self) -> Vec<&FileEntry> {
        let mut out = Vec::with_capacity(self.file_count());
        for dir in &self.dirs {
            dir.collect_files(&mut out);
        }
        out.extend(self.files.iter());
        out
    }

    /// Exclusive references to every file, for the hasher pool
    pub fn all_files_mut(&mut self) -> Vec<&mut FileEntry> {
        let mut out = Vec::with_capacity(self.file_count());
        for dir in &mut self.dirs {
            dir.collect_files_mut(&mut out);
        }
        out.extend(self.files.iter_mut());
        out
    }

    /// Drop every file for which `keep` returns false; returns how many went
    pub fn retain_files<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&FileEntry) -> bool,
    {
        let before = self.files.len();
        self.files.retain(|f| keep(f));
        let mut removed = before - self.files.len();
        for dir in &mut self.dirs {
            removed += dir.retain_files(&mut keep);
        }
        removed
    }

    /// Check structural invariants
    ///
    /// The version must be readable by this build, every file must carry a
    /// digest and no two entries of one directory may share a name.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let version: FormatVersion = self.version.parse().map_err(|e: CairnError| e.to_string())?;
        version.ensure_readable().map_err(|e| e.to_string())?;
        validate_level("<root>", &self.dirs, &self.files)
    }
}

fn validate_level(
    parent: &str,
    dirs: &[DirEntry],
    files: &[FileEntry],
) -> std::result::Result<(), String> {
    let mut names = HashSet::with_capacity(dirs.len() + files.len());
    for file in files {
        if !is_entry_name(&file.name) || !names.insert(file.name.as_str()) {
            return Err(format!("invalid or duplicate name {:?} in {}", file.name, parent));
        }
        if !file.is_hashed() {
            return Err(format!("file {:?} in {} has no hash", file.name, parent));
        }
    }
    for dir in dirs {
        if !is_entry_name(&dir.name) || !names.insert(dir.name.as_str()) {
            return Err(format!("invalid or duplicate name {:?} in {}", dir.name, parent));
        }
        validate_level(&dir.name, &dir.dirs, &dir.files)?;
    }
    Ok(())
}

/// Whether `name` is exactly one normal path component
///
/// Entry names are joined onto the restore destination, so anything that
/// could climb out of it or replace it (`..`, separators, roots, drive
/// prefixes) is refused.
fn is_entry_name(name: &str) -> bool {
    if name.is_empty() || name.contains('/') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == name
    )
}

/// Serialize `manifest` to `path`, creating the parent directory if needed
///
/// An existing file at `path` is replaced.
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CairnError::path_io("error creating directory", parent, e))?;
    }
    let data = serde_json::to_vec(manifest)?;
    atomic_write(path, &data)?;
    debug!(
        "Wrote manifest {:?} ({} files, {} bytes)",
        path,
        manifest.file_count(),
        data.len()
    );
    Ok(())
}

/// Read and validate the manifest at `path`
///
/// # Errors
///
/// - [`CairnError::PathIo`] if the file cannot be read
/// - [`CairnError::MalformedManifest`] if it does not parse or validate
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let data =
        fs::read(path).map_err(|e| CairnError::path_io("cannot read backup file", path, e))?;
    let malformed = |reason: String| CairnError::MalformedManifest {
        path: path.to_path_buf(),
        reason,
    };
    let manifest: Manifest = serde_json::from_slice(&data).map_err(|e| malformed(e.to_string()))?;
    manifest.validate().map_err(malformed)?;
    Ok(manifest)
}

/// File name for a manifest started at `time`: `YYYY-MM-DD_hh-mm-ss.json`
pub fn manifest_file_name(time: &NaiveDateTime) -> String {
    format!("{}.{}", time.format(NAME_FORMAT), EXTENSION)
}

/// Start time encoded in a manifest file name, if it is one
pub fn parse_manifest_name(name: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(".json")?;
    let shape_ok = stem.len() == 19
        && stem.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 | 13 | 16 => b == b'-',
            10 => b == b'_',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    NaiveDateTime::parse_from_str(stem, NAME_FORMAT).ok()
}

/// Reject backup names that are not a single plain path component
pub fn validate_backup_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(CairnError::InvalidBackupName(name.to_string()));
    }
    Ok(())
}

/// Directory holding manifests for `name` (or unnamed ones)
pub fn manifest_dir(backups_dir: &Path, name: Option<&str>) -> Result<PathBuf> {
    match name {
        Some(name) => {
            validate_backup_name(name)?;
            Ok(backups_dir.join(name))
        }
        None => Ok(backups_dir.to_path_buf()),
    }
}

/// Locate a manifest by backup name and date prefix
///
/// Regular files in the group directory are considered in name order; the
/// first whose name starts with `date` wins. A prefix shared by several
/// snapshots (e.g. `2024-03`) therefore selects the oldest of them.
///
/// # Errors
///
/// - [`CairnError::BackupNotFound`] if nothing matches
pub fn find_manifest(backups_dir: &Path, name: Option<&str>, date: &str) -> Result<PathBuf> {
    let dir = manifest_dir(backups_dir, name)?;
    let describe = || match name {
        Some(n) => format!("name {:?} and date {:?}", n, date),
        None => format!("date {:?}", date),
    };
    if !dir.is_dir() {
        return Err(CairnError::BackupNotFound(describe()));
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| CairnError::path_io("error listing", &dir, e))? {
        let entry = entry.map_err(|e| CairnError::path_io("error listing", &dir, e))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            candidates.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    candidates.sort();

    candidates
        .into_iter()
        .find(|candidate| candidate.starts_with(date))
        .map(|found| dir.join(found))
        .ok_or_else(|| CairnError::BackupNotFound(describe()))
}

/// Every snapshot in the repository, grouped by backup name
///
/// The unnamed group always comes first, followed by named groups sorted
/// case-insensitively. Snapshot times are ascending within each group.
pub fn list_manifests(backups_dir: &Path) -> Result<Vec<BackupGroup>> {
    let mut groups = vec![BackupGroup {
        name: None,
        snapshots: snapshots_in(backups_dir)?,
    }];

    let mut named = Vec::new();
    for entry in fs::read_dir(backups_dir)
        .map_err(|e| CairnError::path_io("error listing", backups_dir, e))?
    {
        let entry = entry.map_err(|e| CairnError::path_io("error listing", backups_dir, e))?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            let name = entry.file_name().to_string_lossy().into_owned();
            named.push(BackupGroup {
                snapshots: snapshots_in(&entry.path())?,
                name: Some(name),
            });
        }
    }
    named.sort_by(|a, b| {
        let a = a.name.as_deref().unwrap_or_default();
        let b = b.name.as_deref().unwrap_or_default();
        a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
    });

    groups.extend(named);
    Ok(groups)
}

fn snapshots_in(dir: &Path) -> Result<Vec<NaiveDateTime>> {
    let mut times = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CairnError::path_io("error listing", dir, e))? {
        let entry = entry.map_err(|e| CairnError::path_io("error listing", dir, e))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if let Some(time) = parse_manifest_name(&entry.file_name().to_string_lossy()) {
            times.push(time);
        }
    }
    times.sort();
    Ok(times)
}
