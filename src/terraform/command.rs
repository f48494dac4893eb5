//! Subprocess runner with a timeout and per-stream log sinks.
//!
//! stdout and stderr are each drained by their own task while the child
//! runs, so a chatty process can never block on a full pipe. Every line goes
//! to an append-only file (`<run_id>.out` / `<run_id>.err`) and is also kept
//! in memory for error reporting.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Readers get this long to hit EOF after the child was killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` exited with {}", command_line(.program, .args), exit_code(.code))]
    Failed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("`{program}` timed out after {}s", .timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("failed to write command log {}: {source}", .path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    /// (stdout, stderr) captured before the command failed.
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            CommandError::Failed { stdout, stderr, .. }
            | CommandError::TimedOut { stdout, stderr, .. } => Some((stdout, stderr)),
            CommandError::Spawn { .. } | CommandError::Log { .. } => None,
        }
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands for one reconciliation run.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    log_dir: PathBuf,
    run_id: String,
}

impl CommandRunner {
    pub fn new(log_dir: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            run_id: run_id.into(),
        }
    }

    pub fn stdout_log(&self) -> PathBuf {
        self.log_dir.join(format!("{}.out", self.run_id))
    }

    pub fn stderr_log(&self) -> PathBuf {
        self.log_dir.join(format!("{}.err", self.run_id))
    }

    /// Run `program args..` in `cwd`, killing it once `timeout` elapses.
    ///
    /// Both drain tasks are joined before the exit status is inspected.
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        tokio::fs::create_dir_all(&self.log_dir)
            .await
            .map_err(|source| CommandError::Log {
                path: self.log_dir.clone(),
                source,
            })?;

        tracing::debug!(
            run_id = %self.run_id,
            command = %command_line(program, args),
            cwd = %cwd.display(),
            timeout_secs = timeout.as_secs(),
            "spawning command"
        );

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout_drain = child.stdout.take().map(|s| Drain::spawn(s, self.stdout_log()));
        let stderr_drain = child.stderr.take().map(|s| Drain::spawn(s, self.stderr_log()));

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        let status = match waited {
            Ok(status) => Some(status.map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?),
            Err(_) => {
                tracing::warn!(run_id = %self.run_id, %program, "command timed out; killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill timed out command");
                }
                None
            }
        };

        let grace = status.is_none().then_some(DRAIN_GRACE);
        let stdout = Drain::join(stdout_drain, grace).await;
        let stderr = Drain::join(stderr_drain, grace).await;
        let (stdout, stderr) = (stdout?, stderr?);

        match status {
            None => Err(CommandError::TimedOut {
                program: program.to_string(),
                timeout,
                stdout,
                stderr,
            }),
            Some(status) if status.success() => Ok(CommandOutput { stdout, stderr }),
            Some(status) => Err(CommandError::Failed {
                program: program.to_string(),
                args: args.to_vec(),
                code: status.code(),
                stdout,
                stderr,
            }),
        }
    }
}

/// Reader task for one stream. Captured text lives outside the task so it
/// survives an abort.
struct Drain {
    task: JoinHandle<Result<(), CommandError>>,
    captured: Arc<Mutex<String>>,
    sink: PathBuf,
}

impl Drain {
    fn spawn<R>(stream: R, sink: PathBuf) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let captured = Arc::new(Mutex::new(String::new()));
        let task = tokio::spawn(pump(stream, sink.clone(), Arc::clone(&captured)));
        Self {
            task,
            captured,
            sink,
        }
    }

    /// Wait for the reader, or at most `grace` when the child was killed.
    async fn join(drain: Option<Self>, grace: Option<Duration>) -> Result<String, CommandError> {
        let Some(Drain {
            task,
            captured,
            sink,
        }) = drain
        else {
            return Ok(String::new());
        };

        let joined = match grace {
            None => Some(task.await),
            Some(grace) => {
                let abort = task.abort_handle();
                let joined = tokio::time::timeout(grace, task).await.ok();
                if joined.is_none() {
                    // a grandchild may still hold the pipe open
                    abort.abort();
                }
                joined
            }
        };

        match joined {
            Some(Ok(Err(e))) => return Err(e),
            Some(Err(e)) => {
                return Err(CommandError::Log {
                    path: sink,
                    source: std::io::Error::other(e),
                });
            }
            Some(Ok(Ok(()))) | None => {}
        }

        let text = match captured.lock() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(text)
    }
}

async fn pump<R>(stream: R, sink: PathBuf, captured: Arc<Mutex<String>>) -> Result<(), CommandError>
where
    R: AsyncRead + Unpin,
{
    let log_err = |source| CommandError::Log {
        path: sink.clone(),
        source,
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&sink)
        .await
        .map_err(log_err)?;

    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await.map_err(log_err)?;
        if read == 0 {
            break;
        }
        file.write_all(&line).await.map_err(log_err)?;
        let text = String::from_utf8_lossy(&line);
        match captured.lock() {
            Ok(mut buffer) => buffer.push_str(&text),
            Err(poisoned) => poisoned.into_inner().push_str(&text),
        }
    }
    file.flush().await.map_err(log_err)?;
    Ok(())
}
