//! Bounded external command execution

use crate::error::{FleetError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Run `program args..` and return its stdout
///
/// The child is killed if it does not exit within `timeout`.
pub async fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let rendered = render(program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command = %rendered, "Running external command");

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(FleetError::runtime(rendered, e.to_string())),
        Err(_) => {
            return Err(FleetError::CommandTimeout {
                command: rendered,
                timeout,
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FleetError::runtime(
            rendered,
            format!("{}: {}", output.status, stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a command line through `sh -c`
pub async fn run_shell(line: &str, timeout: Duration) -> Result<String> {
    run_command("sh", &["-c", line], timeout).await
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
