//! Bounded subprocess execution for the media tools.

use crate::ports::media::TranscodeError;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Lines of stderr kept for diagnostics.
const STDERR_TAIL_LINES: usize = 40;

#[derive(Debug, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Run `program` to completion or until `timeout`, killing it on expiry.
///
/// stderr is streamed and only its tail retained. stdout is collected only
/// when `capture_stdout` is set, otherwise it is discarded at the OS level.
pub async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
    capture_stdout: bool,
) -> Result<CommandOutput, TranscodeError> {
    let command_line = render(program, args);
    debug!(command = %command_line, "spawning");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TranscodeError::Spawn {
            command: command_line.clone(),
            source,
        })?;

    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        Vec::from(tail).join("\n")
    });

    let stdout = child.stdout.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stdout) = stdout {
            if let Err(e) = stdout.read_to_end(&mut buf).await {
                warn!(error = %e, "failed to read child stdout");
            }
        }
        buf
    });

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    let status = match waited {
        Ok(status) => status?,
        Err(_) => {
            warn!(command = %command_line, timeout_secs = timeout.as_secs(), "timed out, killing process");
            if let Err(e) = child.kill().await {
                warn!(command = %command_line, error = %e, "failed to kill timed out process");
            }
            stderr_task.abort();
            stdout_task.abort();
            return Err(TranscodeError::Timeout {
                command: command_line,
                after: timeout,
            });
        }
    };

    let stderr = stderr_task.await.unwrap_or_default();
    let stdout = stdout_task.await.unwrap_or_default();

    if status.success() {
        Ok(CommandOutput { stdout, stderr })
    } else {
        Err(TranscodeError::Failed {
            command: command_line,
            status: describe(status),
            exit_code: status.code(),
            stderr,
        })
    }
}

fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
