//! Command runner seam.
//!
//! The executor treats "run this command string, report exit status,
//! captured output and duration" as a black box behind [`CommandRunner`].
//! [`ShellRunner`] is the production implementation: it runs each command
//! through a shell in its own process group so that a timeout can kill the
//! command together with everything it spawned. Processes the shell leaves
//! running in the background are killed when it exits.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long to wait for pipe readers once the command's processes are gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// One command to run.
#[derive(Debug, Clone)]
pub struct CommandRequest {
  pub command: String,
  pub cwd: PathBuf,
  pub shell: Option<String>,
  pub timeout: Option<Duration>,
}

/// A command that ran to completion (successfully or not).
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
  /// `None` when the process was terminated by a signal.
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.exit_code == Some(0)
  }
}

/// A command that did not run to completion.
#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("failed to launch command: {0}")]
  Launch(#[source] io::Error),

  #[error("command timed out after {after:?}")]
  TimedOut {
    after: Duration,
    stdout: String,
    stderr: String,
  },
}

/// Executes command strings on behalf of the executor.
pub trait CommandRunner: Send + Sync + 'static {
  fn run(&self, request: &CommandRequest) -> impl Future<Output = Result<CommandOutput, RunnerError>> + Send;
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
  fn run(&self, request: &CommandRequest) -> impl Future<Output = Result<CommandOutput, RunnerError>> + Send {
    run_shell(request.clone())
  }
}

async fn run_shell(request: CommandRequest) -> Result<CommandOutput, RunnerError> {
  let (shell_cmd, shell_args) = get_shell(request.shell.as_deref());

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(&request.command)
    .current_dir(&request.cwd)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  #[cfg(unix)]
  command.process_group(0);

  debug!(shell = %shell_cmd, cwd = ?request.cwd, cmd = %request.command, "spawning process");

  let start = Instant::now();
  let mut child = command.spawn().map_err(RunnerError::Launch)?;
  // Tokio forgets the pid once the child is reaped; the group outlives it.
  let pid = child.id();

  let stdout = tokio::spawn(read_pipe(child.stdout.take()));
  let stderr = tokio::spawn(read_pipe(child.stderr.take()));

  let status = match request.timeout {
    Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
      Ok(status) => status.map_err(RunnerError::Launch)?,
      Err(_) => {
        debug!(cmd = %request.command, ?limit, "command timed out, killing process group");
        kill_group(pid);
        if let Err(e) = child.kill().await {
          debug!(error = %e, "failed to kill child");
        }
        return Err(RunnerError::TimedOut {
          after: limit,
          stdout: drain(stdout).await,
          stderr: drain(stderr).await,
        });
      }
    },
    None => child.wait().await.map_err(RunnerError::Launch)?,
  };

  // Background descendants would otherwise keep the pipes open.
  kill_group(pid);

  let output = CommandOutput {
    exit_code: status.code(),
    stdout: drain(stdout).await,
    stderr: drain(stderr).await,
    duration: start.elapsed(),
  };

  if !output.success() {
    if !output.stderr.is_empty() {
      debug!(stderr = %output.stderr, "command stderr");
    }
    if !output.stdout.is_empty() {
      debug!(stdout = %output.stdout, "command stdout");
    }
  }

  Ok(output)
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
  let mut buf = Vec::new();
  if let Some(mut pipe) = pipe {
    // A read error just truncates the capture.
    let _ = pipe.read_to_end(&mut buf).await;
  }
  String::from_utf8_lossy(&buf).into_owned()
}

/// Collect a pipe reader, giving up after [`PIPE_DRAIN_GRACE`].
async fn drain(handle: JoinHandle<String>) -> String {
  match tokio::time::timeout(PIPE_DRAIN_GRACE, handle).await {
    Ok(joined) => joined.unwrap_or_default(),
    Err(_) => String::new(),
  }
}

/// Kill every process left in the command's process group.
///
/// Without process groups (Windows) only the child itself is killed, through
/// `kill_on_drop`, and the pipe drain is bounded instead.
fn kill_group(pid: Option<u32>) {
  #[cfg(unix)]
  if let Some(pid) = pid {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
      Ok(()) | Err(Errno::ESRCH) => {}
      Err(e) => debug!(pid, error = %e, "failed to kill process group"),
    }
  }

  #[cfg(not(unix))]
  let _ = pid;
}

/// Get the shell command and arguments for the current platform.
///
/// Commands run through `/bin/sh` (Unix) or PowerShell (Windows) rather than
/// `$SHELL`, since interactive shells may source profile files. Use
/// `override_shell` to pick a different one explicitly.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
