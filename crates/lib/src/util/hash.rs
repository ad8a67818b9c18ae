//! Hashing utilities for content fingerprints.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 digest of some content
//! - `hash_file()`: streaming single-file hashing
//! - `hash_bytes()`: arbitrary byte hashing
//! - `SignatureHasher`: order-sensitive hashing of labelled parts, used for
//!   target fingerprints

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A full 64-character SHA-256 hash of some content.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl ContentHash {
  /// The first 12 characters, for log lines.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(12)]
  }
}

/// Compute the SHA-256 hash of a single file.
///
/// The file is read in chunks so large build products are never loaded into
/// memory at once. Only content is hashed, never metadata.
pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut file = File::open(path)?;
  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 64 * 1024];

  loop {
    let read = file.read(&mut buffer)?;
    if read == 0 {
      break;
    }
    hasher.update(&buffer[..read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file if it exists.
///
/// Returns `Ok(None)` when the path does not exist, so callers can tell a
/// missing file apart from one that could not be read.
pub fn hash_file_if_exists(path: &Path) -> io::Result<Option<ContentHash>> {
  match hash_file(path) {
    Ok(hash) => Ok(Some(hash)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
  }
}

/// Compute the SHA-256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(hex::encode(hasher.finalize()))
}

/// Incremental hasher over labelled parts.
///
/// Each part is written as `label`, a NUL, its length and the bytes, so
/// `("ab", "c")` and `("a", "bc")` never collide.
pub struct SignatureHasher {
  hasher: Sha256,
}

impl Default for SignatureHasher {
  fn default() -> Self {
    Self::new()
  }
}

impl SignatureHasher {
  pub fn new() -> Self {
    Self { hasher: Sha256::new() }
  }

  /// Append one labelled part.
  pub fn part(&mut self, label: &str, value: &[u8]) -> &mut Self {
    self.hasher.update(label.as_bytes());
    self.hasher.update([0u8]);
    self.hasher.update((value.len() as u64).to_le_bytes());
    self.hasher.update(value);
    self
  }

  pub fn finish(self) -> ContentHash {
    ContentHash(hex::encode(self.hasher.finalize()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn hash_bytes_is_deterministic() {
    let a = hash_bytes(b"hello");
    let b = hash_bytes(b"hello");
    assert_eq!(a, b);
    assert_eq!(a.0.len(), 64);
    assert_ne!(a, hash_bytes(b"hello!"));
  }

  #[test]
  fn hash_file_matches_hash_bytes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.txt");
    std::fs::write(&path, "some content").unwrap();

    assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"some content"));
  }

  #[test]
  fn hash_file_if_exists_reports_missing() {
    let temp = TempDir::new().unwrap();
    assert!(hash_file_if_exists(&temp.path().join("nope")).unwrap().is_none());
  }

  #[test]
  fn hash_ignores_modification_time() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.txt");
    std::fs::write(&path, "same").unwrap();
    let before = hash_file(&path).unwrap();

    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file
      .set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(3600))
      .unwrap();
    drop(file);

    assert_eq!(hash_file(&path).unwrap(), before);
  }

  #[test]
  fn signature_parts_do_not_collide_across_boundaries() {
    let mut first = SignatureHasher::new();
    first.part("x", b"ab").part("y", b"c");
    let mut second = SignatureHasher::new();
    second.part("x", b"a").part("y", b"bc");
    assert_ne!(first.finish(), second.finish());
  }

  #[test]
  fn short_hash_is_prefix() {
    let hash = hash_bytes(b"abc");
    assert_eq!(hash.short().len(), 12);
    assert!(hash.0.starts_with(hash.short()));
  }
}
