//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the workflow file, its
/// outputs and the state directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub sakefile: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file, copied to `Sakefile.yaml`.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let sakefile = temp.path().join("Sakefile.yaml");
    std::fs::write(&sakefile, fixture_content(name)).unwrap();
    Self { temp, sakefile }
  }

  /// Path relative to the temp directory.
  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.path(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.path(relative_path)).unwrap()
  }

  /// State directory (isolated per test).
  pub fn state_path(&self) -> PathBuf {
    self.path("state")
  }

  /// Get a pre-configured Command for the sake binary.
  ///
  /// Runs in the temp directory with `SAKE_STATE_DIR` pointing at
  /// [`Self::state_path`] and no inherited `SAKE_JOBS`/`SAKE_LOG`.
  pub fn sake_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("sake");
    cmd.current_dir(self.temp.path());
    cmd.env("SAKE_STATE_DIR", self.state_path());
    cmd.env_remove("SAKE_JOBS");
    cmd.env_remove("SAKE_LOG");
    cmd
  }
}
