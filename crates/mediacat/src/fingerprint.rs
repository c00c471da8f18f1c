//! Content fingerprints.
//!
//! A fingerprint is a hex digest of a file's bytes. Fingerprinting never
//! fails: an unreadable file gets [`FINGERPRINT_UNAVAILABLE`] and the caller
//! decides how loudly to report it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Recorded in place of a digest when the file could not be read.
pub const FINGERPRINT_UNAVAILABLE: &str = "unavailable:read-failed";

const READ_BUF_SIZE: usize = 64 * 1024;

/// Maps a file to a deterministic digest of its content.
pub trait Fingerprinter: Send + Sync {
    /// Digest of the file's bytes, or [`FINGERPRINT_UNAVAILABLE`].
    fn fingerprint(&self, path: &Path) -> String;

    fn algorithm(&self) -> FingerprintAlgorithm;
}

/// Digest algorithms available to a catalog build.
///
/// Two catalogs only compare meaningfully when built with the same one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl FingerprintAlgorithm {
    pub fn fingerprinter(self) -> Arc<dyn Fingerprinter> {
        match self {
            Self::Blake3 => Arc::new(Blake3Fingerprinter),
            Self::Sha256 => Arc::new(Sha256Fingerprinter),
        }
    }
}

pub fn is_unavailable(fingerprint: &str) -> bool {
    fingerprint == FINGERPRINT_UNAVAILABLE
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Fingerprinter;

impl Fingerprinter for Blake3Fingerprinter {
    fn fingerprint(&self, path: &Path) -> String {
        let mut hasher = blake3::Hasher::new();
        match feed(path, |chunk| {
            hasher.update(chunk);
        }) {
            Ok(()) => hasher.finalize().to_hex().to_string(),
            Err(err) => unavailable(path, err),
        }
    }

    fn algorithm(&self) -> FingerprintAlgorithm {
        FingerprintAlgorithm::Blake3
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, path: &Path) -> String {
        let mut hasher = Sha256::new();
        match feed(path, |chunk| hasher.update(chunk)) {
            Ok(()) => format!("{:x}", hasher.finalize()),
            Err(err) => unavailable(path, err),
        }
    }

    fn algorithm(&self) -> FingerprintAlgorithm {
        FingerprintAlgorithm::Sha256
    }
}

fn feed(path: &Path, mut update: impl FnMut(&[u8])) -> io::Result<()> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        update(&buf[..n]);
    }
}

fn unavailable(path: &Path, err: io::Error) -> String {
    debug!(path = %path.display(), error = %err, "Fingerprint read failed");
    FINGERPRINT_UNAVAILABLE.to_string()
}
