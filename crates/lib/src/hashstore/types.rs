//! Types for persisted content fingerprints.

use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::hash::ContentHash;

/// Digest algorithm a fingerprint was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
  #[default]
  Sha256,
}

impl std::fmt::Display for Algorithm {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Algorithm::Sha256 => write!(f, "sha256"),
    }
  }
}

/// A content digest recorded at a point in time.
///
/// Two fingerprints are equal iff their digests are equal; `recorded_at` is
/// informational only and never takes part in comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
  pub digest: ContentHash,
  #[serde(default)]
  pub algorithm: Algorithm,
  /// Unix seconds at which the digest was computed.
  pub recorded_at: u64,
}

impl Fingerprint {
  /// Fingerprint `digest`, stamped with the current time.
  pub fn new(digest: ContentHash) -> Self {
    Self {
      digest,
      algorithm: Algorithm::Sha256,
      recorded_at: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }

  /// True when this fingerprint records `digest`.
  pub fn matches(&self, digest: &ContentHash) -> bool {
    &self.digest == digest
  }
}

impl PartialEq for Fingerprint {
  fn eq(&self, other: &Self) -> bool {
    self.digest == other.digest
  }
}

impl Eq for Fingerprint {}

/// Errors reading or writing the persisted HashStore.
///
/// Any of these is fatal for a run: build-state integrity can no longer be
/// guaranteed. Previously committed state is never corrupted because saves
/// go through a temporary file and a rename.
#[derive(Debug, Error)]
pub enum HashStoreError {
  #[error("failed to create state directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read hash store {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse hash store {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize hash store: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write hash store {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("unsupported hash store version {0}")]
  UnsupportedVersion(u32),
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::hash_bytes;

  #[test]
  fn equality_ignores_timestamp() {
    let mut a = Fingerprint::new(hash_bytes(b"x"));
    let mut b = Fingerprint::new(hash_bytes(b"x"));
    a.recorded_at = 1;
    b.recorded_at = 2_000_000_000;
    assert_eq!(a, b);
    assert_ne!(a, Fingerprint::new(hash_bytes(b"y")));
  }

  #[test]
  fn algorithm_serializes_lowercase() {
    let json = serde_json::to_string(&Algorithm::Sha256).unwrap();
    assert_eq!(json, "\"sha256\"");
    assert!(serde_json::from_str::<Algorithm>("\"md5\"").is_err());
  }
}
