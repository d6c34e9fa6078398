//! Port implementations that shell out to configured commands.
//!
//! Templates are split on whitespace and run without a shell; placeholders
//! like `{agent_id}` are substituted per argument, so a value containing
//! spaces stays one argument.

mod git;
mod sandbox;

pub use git::CommandGitHost;
pub use sandbox::CommandSandbox;

use crate::error::{GastownError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

pub const MAX_OUTPUT_CAPTURE_BYTES: usize = 1_048_576;

#[derive(Debug, Clone)]
pub struct StreamCapture {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl StreamCapture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).trim().to_string()
    }
}

/// Exit status and captured output of one command run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Stderr if the command wrote any, else a description of the exit.
    #[must_use]
    pub fn failure_detail(&self) -> String {
        if !self.stderr.is_empty() {
            return self.stderr.clone();
        }
        self.exit_code.map_or_else(
            || "terminated by signal".to_string(),
            |code| format!("exit code {code}"),
        )
    }
}

/// Renders `template` into argv.
///
/// # Errors
/// `ExternalUnavailable` when the template is blank.
pub fn render_template(template: &str, what: &str, values: &[(&str, &str)]) -> Result<Vec<String>> {
    let argv: Vec<String> = template
        .split_whitespace()
        .map(|token| {
            values.iter().fold(token.to_string(), |arg, (key, value)| {
                arg.replace(&format!("{{{key}}}"), value)
            })
        })
        .collect();
    if argv.is_empty() {
        return Err(GastownError::ExternalUnavailable(format!(
            "no execution target configured for {what}"
        )));
    }
    Ok(argv)
}

pub async fn capture_stream_limited<R>(mut stream: R, max_bytes: usize) -> Result<StreamCapture>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut chunk = [0_u8; 8_192];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }

        let remaining = max_bytes.saturating_sub(bytes.len());
        if remaining == 0 {
            truncated = true;
            continue;
        }

        let to_copy = remaining.min(read);
        bytes.extend_from_slice(&chunk[..to_copy]);
        if to_copy < read {
            truncated = true;
        }
    }

    Ok(StreamCapture { bytes, truncated })
}

/// Runs `argv` to completion, killing it after `limit`.
///
/// # Errors
/// `ExternalUnavailable` when the program cannot be spawned, its output cannot
/// be read, or it outlives `limit`. A non-zero exit is not an error.
pub async fn run_command(argv: &[String], limit: Duration) -> Result<CommandOutput> {
    let Some((program, args)) = argv.split_first() else {
        return Err(GastownError::ExternalUnavailable(
            "empty command line".to_string(),
        ));
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| GastownError::ExternalUnavailable(format!("Failed to execute {program}: {err}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| GastownError::ExternalUnavailable(format!("Failed to capture {program} stdout")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| GastownError::ExternalUnavailable(format!("Failed to capture {program} stderr")))?;

    let stdout_task =
        tokio::spawn(async move { capture_stream_limited(stdout, MAX_OUTPUT_CAPTURE_BYTES).await });
    let stderr_task =
        tokio::spawn(async move { capture_stream_limited(stderr, MAX_OUTPUT_CAPTURE_BYTES).await });

    let status = if let Ok(wait_result) = tokio::time::timeout(limit, child.wait()).await {
        wait_result.map_err(|err| GastownError::ExternalUnavailable(format!("Failed to wait for {program}: {err}")))?
    } else {
        let _ = child.kill().await;
        stdout_task.abort();
        stderr_task.abort();
        return Err(GastownError::ExternalUnavailable(format!(
            "{program} timed out after {}ms",
            limit.as_millis()
        )));
    };

    let stdout_capture = stdout_task
        .await
        .map_err(|err| GastownError::ExternalUnavailable(format!("Failed to read {program} stdout: {err}")))??;
    let stderr_capture = stderr_task
        .await
        .map_err(|err| GastownError::ExternalUnavailable(format!("Failed to read {program} stderr: {err}")))??;

    if stdout_capture.truncated || stderr_capture.truncated {
        debug!(program = %program, "Command output truncated");
    }

    Ok(CommandOutput {
        success: status.success(),
        exit_code: status.code(),
        stdout: stdout_capture.text(),
        stderr: stderr_capture.text(),
    })
}
