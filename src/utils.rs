//! Utility functions for Cairn
//!
//! Small helpers shared by the walker, the content store and the
//! orchestrators.
//!
//! ## Categories of Utilities
//!
//! ### Platform Probes
//! - Hidden-file detection (dotfiles on Unix, the hidden attribute on Windows)
//! - One-level symlink resolution
//!
//! ### File Operations
//! - Buffered copying through a caller-owned buffer
//! - Atomic file writing
//!
//! ### Formatting
//! - Human-readable byte counts
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use crate::utils::{copy_with_buffer, format_bytes};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut buffer = vec![0u8; 64 * 1024];
//! let mut src = std::fs::File::open("in.bin")?;
//! let mut dst = std::fs::File::create("out.bin")?;
//! let copied = copy_with_buffer(&mut src, &mut dst, &mut buffer)?;
//! println!("copied {}", format_bytes(copied));
//! # Ok(())
//! # }
//! ```

use crate::error::{CairnError, Result};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

/// Check whether a directory entry is hidden on this platform
///
/// On Unix a name starting with `.` is hidden; `path` is not consulted.
///
/// # Errors
///
/// Never fails on Unix.
#[cfg(unix)]
pub fn is_hidden(_path: &Path, name: &str) -> Result<bool> {
    Ok(name.starts_with('.'))
}

/// Check whether a directory entry is hidden on this platform
///
/// On Windows the `FILE_ATTRIBUTE_HIDDEN` bit of the entry decides.
///
/// # Errors
///
/// - [`CairnError::PathIo`] if the attributes cannot be read
#[cfg(windows)]
pub fn is_hidden(path: &Path, _name: &str) -> Result<bool> {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;

    let metadata = fs::symlink_metadata(path)
        .map_err(|e| CairnError::path_io("cannot read attributes of", path, e))?;
    Ok(metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
}

/// Resolve a symlink and return the metadata of what it points to
///
/// # Errors
///
/// - [`CairnError::PathIo`] if the link is dangling or the target cannot be
///   stat'ed
pub fn resolve_symlink(path: &Path) -> Result<fs::Metadata> {
    fs::metadata(path).map_err(|e| CairnError::path_io("cannot resolve symlink", path, e))
}

/// Copy everything from `reader` to `writer` through `buffer`
///
/// Unlike `std::io::copy` the buffer is owned by the caller, so a worker can
/// reuse one allocation across every file it handles.
///
/// # Returns
///
/// Number of bytes copied.
pub fn copy_with_buffer<R, W>(reader: &mut R, writer: &mut W, buffer: &mut [u8]) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut total = 0u64;
    loop {
        let n = match reader.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Atomic file write (write to temp file then rename)
///
/// The temporary file is created next to `path`, so the final rename never
/// crosses a filesystem boundary.
///
/// # Errors
///
/// - [`CairnError::PathIo`] if the temporary file cannot be written or
///   published
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| CairnError::path_io("cannot create temporary file in", dir, e))?;
    temp.write_all(content)
        .map_err(|e| CairnError::path_io("cannot write", temp.path().to_path_buf(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| CairnError::path_io("cannot sync", temp.path().to_path_buf(), e))?;
    temp.persist(path)
        .map_err(|e| CairnError::path_io("cannot write", path, e.error))?;
    Ok(())
}

/// Format bytes as human-readable string
///
/// ```rust,ignore
/// use crate::utils::format_bytes;
///
/// assert_eq!(format_bytes(1023), "1023 B");
/// assert_eq!(format_bytes(1536), "1.50 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| CairnError::path_io("cannot create symlink", link, e))
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let result = if target.is_dir() {
        symlink_dir(target, link)
    } else {
        symlink_file(target, link)
    };
    result.map_err(|e| CairnError::path_io("cannot create symlink", link, e))
}
