//! Path handling for workflow files and build state.

use std::path::{Component, Path, PathBuf};

use crate::consts::{STATE_DIR_ENV, STATE_DIR_NAME};

/// Resolve `path` against `base` and normalise it lexically.
///
/// `.` components are dropped and `..` pops the previous component. The file
/// does not need to exist, which is why `std::fs::canonicalize` is not used:
/// declared outputs are usually absent before the first build.
pub fn normalize(base: &Path, path: &Path) -> PathBuf {
  let joined = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };

  let mut out = PathBuf::new();
  for component in joined.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        // Never pop past the root.
        if !matches!(out.components().next_back(), None | Some(Component::RootDir | Component::Prefix(_))) {
          out.pop();
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Directory that holds persisted state for a workflow rooted at `base_dir`.
///
/// `SAKE_STATE_DIR` wins when set; otherwise `.sake/` next to the workflow.
pub fn state_dir(base_dir: &Path) -> PathBuf {
  std::env::var_os(STATE_DIR_ENV)
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .unwrap_or_else(|| base_dir.join(STATE_DIR_NAME))
}

/// Canonical base directory for a workflow file.
pub fn workflow_base_dir(workflow: &Path) -> std::io::Result<PathBuf> {
  let parent = match workflow.parent() {
    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
    _ => PathBuf::from("."),
  };
  dunce::canonicalize(parent)
}
