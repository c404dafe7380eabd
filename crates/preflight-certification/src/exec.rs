//! External process execution shared by the operator-sdk and rpm clients.

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `program args..` to completion, capturing output.
///
/// A non-zero exit is not an error here; callers decide. A zero `timeout`
/// waits indefinitely.
pub async fn run_command(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> anyhow::Result<CommandOutput> {
    let start = Instant::now();
    debug!(program, ?args, "executing command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| anyhow::anyhow!("failed to spawn {}: {}", program, e))?;

    let output = if timeout.is_zero() {
        child.wait_with_output().await?
    } else {
        tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                anyhow::anyhow!("{} timed out after {} seconds", program, timeout.as_secs())
            })??
    };

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
