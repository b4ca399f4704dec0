//! Streaming file hasher
//!
//! A [`Hasher`] owns one read buffer and one digest accumulator. Workers in
//! the [`crate::pool::HasherPool`] each own a `Hasher`, so accumulators are
//! never shared between threads and buffers are allocated once per worker.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cairn::hasher::Hasher;
//! use cairn::settings::HashAlgorithm;
//!
//! let mut hasher = Hasher::new(HashAlgorithm::Sha256, 64 * 1024);
//! let digest = hasher.hash_path(Path::new("photo.jpg"))?;
//! assert_eq!(digest.len(), 32);
//! ```

use crate::error::{CairnError, Result};
use crate::settings::HashAlgorithm;
use crate::types::FileEntry;
use sha2::Digest;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;

/// Digest state for one of the supported algorithms
enum Accumulator {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    Sha3_256(sha3::Sha3_256),
    Sha3_512(sha3::Sha3_512),
}

impl Accumulator {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Accumulator::Md5(md5::Context::new()),
            HashAlgorithm::Sha1 => Accumulator::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => Accumulator::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha512 => Accumulator::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Sha3_256 => Accumulator::Sha3_256(sha3::Sha3_256::new()),
            HashAlgorithm::Sha3_512 => Accumulator::Sha3_512(sha3::Sha3_512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Accumulator::Md5(ctx) => ctx.consume(data),
            Accumulator::Sha1(h) => Digest::update(h, data),
            Accumulator::Sha256(h) => Digest::update(h, data),
            Accumulator::Sha512(h) => Digest::update(h, data),
            Accumulator::Sha3_256(h) => Digest::update(h, data),
            Accumulator::Sha3_512(h) => Digest::update(h, data),
        }
    }

    fn reset(&mut self) {
        match self {
            Accumulator::Md5(ctx) => *ctx = md5::Context::new(),
            Accumulator::Sha1(h) => Digest::reset(h),
            Accumulator::Sha256(h) => Digest::reset(h),
            Accumulator::Sha512(h) => Digest::reset(h),
            Accumulator::Sha3_256(h) => Digest::reset(h),
            Accumulator::Sha3_512(h) => Digest::reset(h),
        }
    }

    /// Produce the digest and leave the accumulator ready for reuse
    fn finalize_reset(&mut self) -> Vec<u8> {
        match self {
            Accumulator::Md5(ctx) => {
                let done = std::mem::replace(ctx, md5::Context::new());
                done.compute().0.to_vec()
            }
            Accumulator::Sha1(h) => h.finalize_reset().to_vec(),
            Accumulator::Sha256(h) => h.finalize_reset().to_vec(),
            Accumulator::Sha512(h) => h.finalize_reset().to_vec(),
            Accumulator::Sha3_256(h) => h.finalize_reset().to_vec(),
            Accumulator::Sha3_512(h) => h.finalize_reset().to_vec(),
        }
    }
}

/// Per-worker file hasher
pub struct Hasher {
    algorithm: HashAlgorithm,
    accumulator: Accumulator,
    buffer: Vec<u8>,
}

impl Hasher {
    /// Create a hasher with its own read buffer of `buffer_size` bytes
    pub fn new(algorithm: HashAlgorithm, buffer_size: usize) -> Self {
        Self {
            algorithm,
            accumulator: Accumulator::new(algorithm),
            buffer: vec![0u8; buffer_size.max(1)],
        }
    }

    /// Create a hasher from a case-insensitive algorithm name
    ///
    /// # Errors
    ///
    /// - [`CairnError::UnsupportedAlgorithm`] if the name is unknown
    pub fn from_name(name: &str, buffer_size: usize) -> Result<Self> {
        Ok(Self::new(name.parse()?, buffer_size))
    }

    /// Algorithm this hasher computes
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hash everything `reader` yields
    pub fn hash_reader<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Vec<u8>> {
        self.accumulator.reset();
        loop {
            let n = match reader.read(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.accumulator.update(&self.buffer[..n]);
        }
        Ok(self.accumulator.finalize_reset())
    }

    /// Hash the file at `path`
    ///
    /// # Errors
    ///
    /// - [`CairnError::PathIo`] if the file cannot be opened or read
    pub fn hash_path(&mut self, path: &Path) -> Result<Vec<u8>> {
        let mut file =
            File::open(path).map_err(|e| CairnError::path_io("cannot open file", path, e))?;
        let digest = self
            .hash_reader(&mut file)
            .map_err(|e| CairnError::path_io("error reading file", path, e))?;
        trace!("Hashed {:?}: {}", path, hex::encode(&digest));
        Ok(digest)
    }

    /// Hash the bytes behind `entry.source_path` and store the digest in `entry.hash`
    ///
    /// # Errors
    ///
    /// - [`CairnError::MissingSourcePath`] if the entry has no source path
    /// - [`CairnError::PathIo`] if the file cannot be read
    pub fn hash_file(&mut self, entry: &mut FileEntry) -> Result<()> {
        let path = entry
            .source_path
            .clone()
            .ok_or_else(|| CairnError::MissingSourcePath(entry.name.clone()))?;
        entry.hash = self.hash_path(&path)?;
        Ok(())
    }

    /// Verify a content store blob against the hash and size in its own name
    ///
    /// The size is compared first, so a blob whose name carries the wrong
    /// size is reported as a size mismatch without being read.
    ///
    /// # Errors
    ///
    /// - [`CairnError::MalformedBlobName`] if the name is not `<hex-hash>-<size>`
    /// - [`CairnError::SizeMismatch`] if the size on disk differs
    /// - [`CairnError::HashMismatch`] if the current bytes hash differently
    /// - [`CairnError::PathIo`] if the blob cannot be read
    pub fn check_file_integrity(&mut self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CairnError::MalformedBlobName(path.to_path_buf()))?;
        let (expected_hash, expected_size) = parse_blob_name(name)
            .ok_or_else(|| CairnError::MalformedBlobName(path.to_path_buf()))?;

        let actual_size = fs::metadata(path)
            .map_err(|e| CairnError::path_io("cannot get information of", path, e))?
            .len();
        if actual_size != expected_size {
            return Err(CairnError::SizeMismatch {
                path: path.to_path_buf(),
                expected: expected_size,
                actual: actual_size,
            });
        }

        let actual_hash = self.hash_path(path)?;
        if actual_hash != expected_hash {
            return Err(CairnError::HashMismatch {
                path: path.to_path_buf(),
                expected: hex::encode(&expected_hash),
                actual: hex::encode(&actual_hash),
            });
        }
        Ok(())
    }
}

/// Split a blob file name `<hex-hash>-<decimal-size>` into its parts
///
/// Returns `None` when either part does not parse.
pub fn parse_blob_name(name: &str) -> Option<(Vec<u8>, u64)> {
    let (hash_part, size_part) = name.split_once('-')?;
    if hash_part.is_empty() || !size_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hash = hex::decode(hash_part).ok()?;
    let size = size_part.parse::<u64>().ok()?;
    Some((hash, size))
}
