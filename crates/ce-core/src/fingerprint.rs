//! Content digests for infected files.
//!
//! The digest lets alerts identify the same sample across hosts and paths.
//! It is computed after the run has finished, so the file may already have
//! been moved or quarantined; callers treat failures as non-fatal.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from fingerprinting a file.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("cannot fingerprint {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Computes a stable content digest for a file.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, path: &Path) -> Result<String, FingerprintError>;
}

/// Lowercase hex SHA-256 over the full file contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, path: &Path) -> Result<String, FingerprintError> {
        let wrap = |source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(wrap)?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(wrap)?;
        Ok(hex::encode(hasher.finalize()))
    }
}
