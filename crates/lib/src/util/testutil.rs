//! Test utilities for sake-lib.
//!
//! `RecordingRunner` stands in for the shell: it records which commands were
//! requested, fails the ones it is told to and tracks peak concurrency.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::execute::{CommandOutput, CommandRequest, CommandRunner, RunnerError};

type Hook = Box<dyn Fn() + Send + Sync>;

/// Write `content` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
  let path = dir.join(name);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(&path, content).unwrap();
  path
}

/// A `CommandRunner` that never spawns processes.
#[derive(Default)]
pub struct RecordingRunner {
  invoked: Mutex<Vec<String>>,
  failures: HashMap<String, i32>,
  hooks: HashMap<String, Hook>,
  delay: Option<Duration>,
  current: AtomicUsize,
  peak: AtomicUsize,
}

impl RecordingRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make `command` exit with `code`.
  pub fn fail_on(mut self, command: &str, code: i32) -> Self {
    self.failures.insert(command.to_string(), code);
    self
  }

  /// Call `hook` when `command` runs, before it reports completion.
  pub fn on_run(mut self, command: &str, hook: impl Fn() + Send + Sync + 'static) -> Self {
    self.hooks.insert(command.to_string(), Box::new(hook));
    self
  }

  /// Sleep this long inside every command.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Commands in the order they were started.
  pub fn invoked(&self) -> Vec<String> {
    self.invoked.lock().unwrap().clone()
  }

  /// Highest number of commands observed running at once.
  pub fn max_concurrency(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

impl CommandRunner for RecordingRunner {
  async fn run(&self, request: &CommandRequest) -> Result<CommandOutput, RunnerError> {
    self.invoked.lock().unwrap().push(request.command.clone());
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if let Some(hook) = self.hooks.get(&request.command) {
      hook();
    }

    self.current.fetch_sub(1, Ordering::SeqCst);
    let exit_code = self.failures.get(&request.command).copied().unwrap_or(0);
    Ok(CommandOutput {
      exit_code: Some(exit_code),
      stdout: format!("ran {}\n", request.command),
      stderr: String::new(),
      duration: self.delay.unwrap_or_default(),
    })
  }
}
