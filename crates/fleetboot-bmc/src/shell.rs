//! Running configured commands
//!
//! Bindings are plain command lines handed to `sh -c`. The child is killed
//! if the caller stops waiting for it.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{BmcError, Result};

/// Default bound on a single binding command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Run a command line, returning its stdout on success
pub async fn run_command(command: &str, timeout: Duration) -> Result<String> {
    debug!(command, "Running binding command");

    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| BmcError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| BmcError::Spawn {
            command: command.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(BmcError::Timeout {
                command: command.to_string(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(BmcError::CommandFailed {
            command: command.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
