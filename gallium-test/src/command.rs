use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Result of running a command
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    /// `None` when the process was terminated by a signal or timed out
    pub exit_code: Option<i32>,
    /// Terminating signal, on platforms that have them
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandResult {
    /// Human readable exit status, used in mismatch messages
    pub fn status_text(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => code.to_string(),
            (None, Some(signal)) => format!("terminated by signal {signal}"),
            (None, None) => "no exit code".to_string(),
        }
    }

    /// stdout followed by stderr
    pub fn combined_output(&self) -> String {
        let mut text = self.stdout.clone();
        text.push_str(&self.stderr);
        text
    }
}

/// Run `program` with `args`, killing it if it outlives `limit`.
///
/// The child never inherits stdin. Both output streams are captured.
pub async fn run_command<I, S>(
    program: &Path,
    args: I,
    limit: Option<Duration>,
) -> Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program.display()))?;

    let output = match limit {
        Some(limit) => match timeout(limit, child.wait_with_output()).await {
            Ok(output) => output,
            // Dropping the future drops the child, which kills it
            Err(_) => {
                return Ok(CommandResult {
                    stderr: format!("Timeout after {}s", limit.as_secs_f64()),
                    timed_out: true,
                    ..Default::default()
                })
            }
        },
        None => child.wait_with_output().await,
    }
    .with_context(|| format!("Failed to wait for {}", program.display()))?;

    Ok(CommandResult {
        exit_code: output.status.code(),
        signal: exit_signal(&output.status),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        timed_out: false,
    })
}

/// Run a command synchronously (wrapper for async version)
pub fn run_command_sync<I, S>(
    program: &Path,
    args: I,
    limit: Option<Duration>,
) -> Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start subprocess runtime")?;
    runtime.block_on(run_command(program, args, limit))
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, limit: Option<Duration>) -> CommandResult {
        run_command_sync(Path::new("/bin/sh"), ["-c", script], limit).unwrap()
    }

    #[test]
    fn test_captures_streams_and_code() {
        let result = sh("printf out; printf err >&2; exit 3", None);
        assert_eq!(result.stdout, "out");
        assert_eq!(result.stderr, "err");
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.status_text(), "3");
        assert_eq!(result.combined_output(), "outerr");
        assert!(!result.timed_out);
    }

    #[test]
    fn test_signal_termination() {
        let result = sh("kill -9 $$", None);
        assert_eq!(result.exit_code, None);
        assert_eq!(result.signal, Some(9));
        assert_eq!(result.status_text(), "terminated by signal 9");
    }

    #[test]
    fn test_timeout_kills_process() {
        let start = std::time::Instant::now();
        let result = sh("sleep 30", Some(Duration::from_millis(200)));
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let result = run_command_sync(
            Path::new("/definitely/not/a/program"),
            Vec::<String>::new(),
            None,
        );
        assert!(result.is_err());
    }
}
