//! Repository settings and format versioning
//!
//! Every repository carries a `settings.toml` at its root, written once by
//! `init` and never changed afterwards:
//!
//! ```toml
//! version = "1.0.0"
//! hashAlgorithm = "sha256"
//! ```
//!
//! The hash algorithm is fixed for the life of the repository because every
//! blob name in the content store is a digest under that algorithm.

use crate::error::{CairnError, Result};
use crate::utils::atomic_write;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// On-disk format version written by this build
pub const FORMAT_VERSION: FormatVersion = FormatVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Name of the settings file inside a repository
pub const SETTINGS_FILE: &str = "settings.toml";

/// Digest algorithms a repository can be created with
///
/// MD5 and SHA-1 are kept selectable for compatibility with existing
/// repositories; neither is collision resistant, and the content store
/// never compares bytes of two blobs that share a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// MD5, 16-byte digest
    Md5,
    /// SHA-1, 20-byte digest
    Sha1,
    /// SHA-256, 32-byte digest
    Sha256,
    /// SHA-512, 64-byte digest
    Sha512,
    /// SHA3-256, 32-byte digest
    Sha3_256,
    /// SHA3-512, 64-byte digest
    Sha3_512,
}

impl HashAlgorithm {
    /// All supported algorithms
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Sha3_512,
    ];

    /// Canonical lowercase name, as stored in `settings.toml`
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha3_256 => "sha3-256",
            HashAlgorithm::Sha3_512 => "sha3-512",
        }
    }

    /// Length of a digest in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 | HashAlgorithm::Sha3_256 => 32,
            HashAlgorithm::Sha512 | HashAlgorithm::Sha3_512 => 64,
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Sha256
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CairnError;

    /// Parse an algorithm name, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        HashAlgorithm::ALL
            .iter()
            .copied()
            .find(|alg| alg.as_str() == lower)
            .ok_or_else(|| CairnError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Format version `major.minor.patch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatVersion {
    /// Incompatible layout changes
    pub major: u32,
    /// Backwards compatible additions
    pub minor: u32,
    /// Fixes
    pub patch: u32,
}

impl FormatVersion {
    /// Whether data written under `self` can be read by this build
    pub fn is_readable(&self) -> bool {
        self.major <= FORMAT_VERSION.major
    }

    /// Fail with [`CairnError::IncompatibleVersion`] unless readable
    pub fn ensure_readable(&self) -> Result<()> {
        if self.is_readable() {
            Ok(())
        } else {
            Err(CairnError::IncompatibleVersion {
                found: self.to_string(),
                supported: FORMAT_VERSION.to_string(),
            })
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for FormatVersion {
    type Err = CairnError;

    /// Parse `1.2.3` or `v1.2.3`; all three parts are required
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CairnError::InvalidVersion(s.to_string());
        let trimmed = s.strip_prefix('v').unwrap_or(s);

        let mut parts = trimmed.split('.');
        let mut next = || -> Result<u32> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(invalid)
        };
        let version = FormatVersion {
            major: next()?,
            minor: next()?,
            patch: next()?,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

impl PartialOrd for FormatVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FormatVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

/// Validated repository settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Format version the repository was created with
    pub version: FormatVersion,
    /// Digest algorithm used for every blob
    pub hash_algorithm: HashAlgorithm,
}

impl Settings {
    /// Settings for a new repository created by this build
    pub fn new(hash_algorithm: HashAlgorithm) -> Self {
        Self {
            version: FORMAT_VERSION,
            hash_algorithm,
        }
    }
}

/// `settings.toml` exactly as stored on disk
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    version: String,
    #[serde(rename = "hashAlgorithm")]
    hash_algorithm: String,
}

/// Read and validate settings from `path`
///
/// # Errors
///
/// - [`CairnError::PathIo`] if the file cannot be read
/// - [`CairnError::MalformedSettings`] if it is not valid settings TOML
/// - [`CairnError::InvalidVersion`] / [`CairnError::IncompatibleVersion`]
///   for a bad or too new version
/// - [`CairnError::UnsupportedAlgorithm`] for an unknown algorithm
pub fn read_settings(path: &Path) -> Result<Settings> {
    let text = fs::read_to_string(path)
        .map_err(|e| CairnError::path_io("cannot read settings in", path, e))?;
    let raw: SettingsFile = toml::from_str(&text).map_err(|e| CairnError::MalformedSettings {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let version: FormatVersion = raw.version.parse()?;
    version.ensure_readable()?;
    let hash_algorithm: HashAlgorithm = raw.hash_algorithm.parse()?;

    debug!("Loaded settings from {:?}: version {}, {}", path, version, hash_algorithm);
    Ok(Settings {
        version,
        hash_algorithm,
    })
}

/// Write settings to `path`, replacing any existing file atomically
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let raw = SettingsFile {
        version: settings.version.to_string(),
        hash_algorithm: settings.hash_algorithm.as_str().to_string(),
    };
    let text = toml::to_string(&raw)?;
    atomic_write(path, text.as_bytes())
}
