// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic persistence of the [`SupervisorState`] document and the pid file.

use std::path::Path;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use sprited_core::SupervisorState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode state document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to parse pid file contents: {0:?}")]
    ParsePid(String),
}

/// Marshal `state` to indented JSON (trailing newline) and write it to
/// `path` atomically via a `path.tmp` write followed by `rename`.
pub async fn write(path: &Path, state: &SupervisorState) -> Result<(), StateStoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut json = serde_json::to_string_pretty(state)?;
    json.push('\n');

    let tmp_path = path.with_extension("json.tmp");
    let result = write_and_rename(&tmp_path, path, &json).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

async fn write_and_rename(tmp_path: &Path, path: &Path, json: &str) -> Result<(), StateStoreError> {
    tokio::fs::write(tmp_path, json.as_bytes()).await?;
    tokio::fs::rename(tmp_path, path).await?;
    Ok(())
}

pub async fn read(path: &Path) -> Result<SupervisorState, StateStoreError> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write `pid` as ASCII decimal followed by `\n`.
pub async fn write_pid(path: &Path, pid: u32) -> Result<(), StateStoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, format!("{pid}\n")).await?;
    Ok(())
}

pub async fn read_pid(path: &Path) -> Result<u32, StateStoreError> {
    let contents = tokio::fs::read_to_string(path).await?;
    contents.trim().parse().map_err(|_| StateStoreError::ParsePid(contents))
}

/// Probe whether `pid` is alive without sending a real signal.
///
/// Non-existent and negative pids return `false`; permission-denied
/// (process exists but is owned by another user) is treated as running.
pub fn process_running(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sprited_core::SupervisorStatus;
    use tempfile::TempDir;

    fn sample_state() -> SupervisorState {
        SupervisorState::new("sprite-1".into(), 4242, "fix bug".into(), Utc::now())
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let state = sample_state();
        write(&path, &state).await.unwrap();
        let read_back = read(&path).await.unwrap();
        assert_eq!(read_back, state);
    }

    #[tokio::test]
    async fn write_leaves_no_tmp_file_on_success() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write(&path, &sample_state()).await.unwrap();
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn write_produces_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        write(&path, &sample_state()).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.ends_with('\n'));
    }

    #[tokio::test]
    async fn pid_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("supervisor.pid");
        write_pid(&path, 1234).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "1234\n");
        assert_eq!(read_pid(&path).await.unwrap(), 1234);
    }

    #[test]
    fn process_running_false_for_nonpositive_pid() {
        assert!(!process_running(0));
        assert!(!process_running(-1));
    }

    #[test]
    fn process_running_true_for_self() {
        assert!(process_running(std::process::id() as i32));
    }

    #[test]
    fn process_running_false_for_unlikely_pid() {
        assert!(!process_running(i32::MAX));
    }

    #[test]
    fn status_default_is_starting() {
        assert_eq!(sample_state().status, SupervisorStatus::Starting);
    }
}
