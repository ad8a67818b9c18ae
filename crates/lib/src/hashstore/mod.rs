//! Persistent store of content fingerprints.
//!
//! The HashStore is the only component that reads or writes persisted build
//! state. It is loaded explicitly at the start of a run, mutated by the
//! executor (a single writer) and saved after every successful target.
//!
//! # Storage Layout
//!
//! ```text
//! {state_dir}/
//! ├── hashstore.json      # HashStoreFile: file + target fingerprints
//! └── .lock               # StateLock metadata
//! ```

pub mod lock;
pub mod types;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{HASHSTORE_FILENAME, HASHSTORE_VERSION};
use crate::util::hash::ContentHash;

pub use lock::{LockMode, StateLock, StateLockError};
pub use types::{Algorithm, Fingerprint, HashStoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct HashStoreFile {
  version: u32,
  #[serde(default)]
  files: BTreeMap<PathBuf, Fingerprint>,
  #[serde(default)]
  targets: BTreeMap<String, Fingerprint>,
}

/// Fingerprints of files and targets, keyed by normalised path or target id.
///
/// Absence of a key means "never observed": callers must treat it as
/// maximally stale, never as equal to anything.
#[derive(Debug, Default)]
pub struct HashStore {
  /// Backing file; `None` for a purely in-memory store.
  path: Option<PathBuf>,
  files: BTreeMap<PathBuf, Fingerprint>,
  targets: BTreeMap<String, Fingerprint>,
}

impl HashStore {
  /// A store that is never persisted.
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// Path of the store file inside `state_dir`.
  pub fn path_in(state_dir: &Path) -> PathBuf {
    state_dir.join(HASHSTORE_FILENAME)
  }

  /// Load the store from `path`.
  ///
  /// A missing file yields an empty store bound to `path`.
  pub fn load(path: &Path) -> Result<Self, HashStoreError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no hash store yet");
        return Ok(Self {
          path: Some(path.to_path_buf()),
          ..Self::default()
        });
      }
      Err(source) => {
        return Err(HashStoreError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let file: HashStoreFile = serde_json::from_str(&content).map_err(|source| HashStoreError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    if file.version != HASHSTORE_VERSION {
      return Err(HashStoreError::UnsupportedVersion(file.version));
    }

    debug!(
      path = %path.display(),
      files = file.files.len(),
      targets = file.targets.len(),
      "loaded hash store"
    );

    Ok(Self {
      path: Some(path.to_path_buf()),
      files: file.files,
      targets: file.targets,
    })
  }

  /// Persist the store.
  ///
  /// Uses atomic write (write to temp, fsync, then rename) so a partially
  /// written store is never observable. No-op for in-memory stores.
  pub fn save(&self) -> Result<(), HashStoreError> {
    let Some(path) = &self.path else {
      return Ok(());
    };

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(|source| HashStoreError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    let file = HashStoreFile {
      version: HASHSTORE_VERSION,
      files: self.files.clone(),
      targets: self.targets.clone(),
    };
    let content = serde_json::to_string_pretty(&file).map_err(HashStoreError::Serialize)?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let write_err = |source| HashStoreError::Write {
      path: path.clone(),
      source,
    };
    let mut temp = fs::File::create(&temp_path).map_err(write_err)?;
    temp.write_all(content.as_bytes()).map_err(write_err)?;
    temp.sync_all().map_err(write_err)?;
    drop(temp);
    fs::rename(&temp_path, path).map_err(write_err)?;

    Ok(())
  }

  /// Backing file, if any.
  pub fn location(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// Last recorded fingerprint of a file.
  pub fn file(&self, path: &Path) -> Option<&Fingerprint> {
    self.files.get(path)
  }

  /// Last recorded fingerprint of a target.
  pub fn target(&self, id: &str) -> Option<&Fingerprint> {
    self.targets.get(id)
  }

  /// Record (overwrite) a file fingerprint.
  pub fn record_file(&mut self, path: PathBuf, digest: ContentHash) {
    debug!(path = %path.display(), digest = %digest.short(), "recording file fingerprint");
    self.files.insert(path, Fingerprint::new(digest));
  }

  /// Record (overwrite) a target fingerprint.
  pub fn record_target(&mut self, id: &str, digest: ContentHash) {
    debug!(target = %id, digest = %digest.short(), "recording target fingerprint");
    self.targets.insert(id.to_string(), Fingerprint::new(digest));
  }

  /// Forget a target fingerprint. Returns whether one existed.
  pub fn forget_target(&mut self, id: &str) -> bool {
    self.targets.remove(id).is_some()
  }

  /// Forget a file fingerprint. Returns whether one existed.
  pub fn forget_file(&mut self, path: &Path) -> bool {
    self.files.remove(path).is_some()
  }

  /// Number of file fingerprints.
  pub fn file_count(&self) -> usize {
    self.files.len()
  }

  /// Number of target fingerprints.
  pub fn target_count(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty() && self.targets.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::hash_bytes;
  use tempfile::TempDir;

  #[test]
  fn load_missing_file_gives_empty_store() {
    let temp = TempDir::new().unwrap();
    let store = HashStore::load(&HashStore::path_in(temp.path())).unwrap();
    assert!(store.is_empty());
    assert!(store.location().is_some());
  }

  #[test]
  fn save_then_load_round_trips() {
    let temp = TempDir::new().unwrap();
    let path = HashStore::path_in(&temp.path().join("state"));

    let mut store = HashStore::load(&path).unwrap();
    store.record_file(PathBuf::from("/w/a.txt"), hash_bytes(b"a"));
    store.record_target("A", hash_bytes(b"sig"));
    store.save().unwrap();

    let loaded = HashStore::load(&path).unwrap();
    assert_eq!(loaded.file(Path::new("/w/a.txt")).unwrap().digest, hash_bytes(b"a"));
    assert_eq!(loaded.target("A").unwrap().digest, hash_bytes(b"sig"));
    assert_eq!(loaded.file_count(), 1);
    assert_eq!(loaded.target_count(), 1);
  }

  #[test]
  fn persisted_layout_has_digest_algorithm_and_timestamp() {
    let temp = TempDir::new().unwrap();
    let path = HashStore::path_in(temp.path());
    let mut store = HashStore::load(&path).unwrap();
    store.record_file(PathBuf::from("/w/a.txt"), hash_bytes(b"a"));
    store.save().unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let entry = &json["files"]["/w/a.txt"];
    assert_eq!(json["version"], HASHSTORE_VERSION);
    assert_eq!(entry["algorithm"], "sha256");
    assert_eq!(entry["digest"], hash_bytes(b"a").0);
    assert!(entry["recorded_at"].as_u64().unwrap() > 0);
  }

  #[test]
  fn save_leaves_no_temp_file() {
    let temp = TempDir::new().unwrap();
    let path = HashStore::path_in(temp.path());
    let store = HashStore::load(&path).unwrap();
    store.save().unwrap();
    assert!(path.exists());
    assert!(!temp.path().join("hashstore.json.tmp").exists());
  }

  #[test]
  fn corrupt_store_is_an_error_and_left_untouched() {
    let temp = TempDir::new().unwrap();
    let path = HashStore::path_in(temp.path());
    fs::write(&path, "{ not json").unwrap();

    assert!(matches!(HashStore::load(&path), Err(HashStoreError::Parse { .. })));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
  }

  #[test]
  fn unknown_version_rejected() {
    let temp = TempDir::new().unwrap();
    let path = HashStore::path_in(temp.path());
    fs::write(&path, r#"{"version": 99, "files": {}, "targets": {}}"#).unwrap();
    assert!(matches!(HashStore::load(&path), Err(HashStoreError::UnsupportedVersion(99))));
  }

  #[test]
  fn record_overwrites_and_forget_removes() {
    let mut store = HashStore::in_memory();
    store.record_target("A", hash_bytes(b"1"));
    store.record_target("A", hash_bytes(b"2"));
    assert_eq!(store.target("A").unwrap().digest, hash_bytes(b"2"));

    assert!(store.forget_target("A"));
    assert!(!store.forget_target("A"));
    assert!(store.target("A").is_none());
  }

  #[test]
  fn in_memory_save_is_noop() {
    let mut store = HashStore::in_memory();
    store.record_file(PathBuf::from("/x"), hash_bytes(b"x"));
    store.save().unwrap();
    assert!(store.location().is_none());
  }
}
