// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers shared by the process sampler and git snapshotter.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for `ps` invocations.
pub const SAMPLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a single `git` subcommand.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`. The child process
/// is killed automatically if the timeout elapses (tokio's `Child` drop).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!("{description} timed out after {}s", timeout.as_secs())),
    }
}
