// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot reads of repository state via `git` subprocesses.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sprited_core::GitSnapshot;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::subprocess::{run_with_timeout, GIT_TIMEOUT};

#[derive(Debug, Error)]
pub enum GitSnapshotError {
    #[error("repo dir {0:?} does not exist or is not a directory")]
    EmptyRepoDir(PathBuf),
    #[error("git invocation failed: {0}")]
    Invocation(String),
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: &'static str, stderr: String },
    #[error("could not parse output of git {command}: {output:?}")]
    Parse { command: &'static str, output: String },
    #[error("snapshot cancelled")]
    Cancelled,
}

/// Reads repository state from a fixed working directory.
#[derive(Debug, Clone)]
pub struct GitSnapshotter {
    repo_dir: PathBuf,
}

impl GitSnapshotter {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self { repo_dir: repo_dir.into() }
    }

    pub async fn snapshot(&self, cancel: &CancellationToken) -> Result<GitSnapshot, GitSnapshotError> {
        if !self.repo_dir.is_dir() {
            return Err(GitSnapshotError::EmptyRepoDir(self.repo_dir.clone()));
        }

        let branch = self.current_branch(cancel).await?;
        let (head, head_time) = self.head_commit(cancel).await?;
        let changed_files = self.porcelain_status_lines(cancel).await?;
        let branches = self.local_branches(cancel).await?;
        let commit_count = self.commit_count(cancel).await?;

        Ok(GitSnapshot::new(branch, head, head_time, changed_files, branches, commit_count))
    }

    async fn run(&self, args: &[&str], command: &'static str, cancel: &CancellationToken) -> Result<String, GitSnapshotError> {
        let mut cmd = Command::new("git");
        cmd.args(["-C", &self.repo_dir.display().to_string()])
            .args(args)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GitSnapshotError::Cancelled),
            result = run_with_timeout(cmd, GIT_TIMEOUT, command) => {
                result.map_err(GitSnapshotError::Invocation)?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitSnapshotError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn current_branch(&self, cancel: &CancellationToken) -> Result<String, GitSnapshotError> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"], "rev-parse --abbrev-ref HEAD", cancel).await
    }

    async fn head_commit(&self, cancel: &CancellationToken) -> Result<(String, DateTime<Utc>), GitSnapshotError> {
        let out = self
            .run(&["log", "-1", "--format=%H %ct"], "log -1 --format", cancel)
            .await?;
        let mut fields = out.split_whitespace();
        let hash = fields.next().unwrap_or("").to_string();
        let epoch: i64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| GitSnapshotError::Parse { command: "log -1 --format", output: out.clone() })?;
        let head_time = DateTime::from_timestamp(epoch, 0)
            .ok_or_else(|| GitSnapshotError::Parse { command: "log -1 --format", output: out })?;
        Ok((hash, head_time))
    }

    async fn porcelain_status_lines(&self, cancel: &CancellationToken) -> Result<i64, GitSnapshotError> {
        let out = self.run(&["status", "--porcelain"], "status --porcelain", cancel).await?;
        Ok(out.lines().filter(|l| !l.trim().is_empty()).count() as i64)
    }

    async fn local_branches(&self, cancel: &CancellationToken) -> Result<Vec<String>, GitSnapshotError> {
        let out = self
            .run(&["branch", "--format=%(refname:short)"], "branch --format", cancel)
            .await?;
        Ok(out.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    async fn commit_count(&self, cancel: &CancellationToken) -> Result<i64, GitSnapshotError> {
        let out = self.run(&["rev-list", "--count", "HEAD"], "rev-list --count HEAD", cancel).await?;
        out.trim()
            .parse()
            .map_err(|_| GitSnapshotError::Parse { command: "rev-list --count HEAD", output: out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::process::Command as TestCommand;

    async fn git(dir: &Path, args: &[&str]) {
        let status = TestCommand::new("git").current_dir(dir).args(args).status().await.unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    async fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q", "-b", "main"]).await;
        git(dir.path(), &["config", "user.email", "test@example.com"]).await;
        git(dir.path(), &["config", "user.name", "Test"]).await;
        tokio::fs::write(dir.path().join("a.txt"), "one").await.unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "initial"]).await;
        dir
    }

    #[tokio::test]
    async fn snapshot_rejects_missing_repo_dir() {
        let snapshotter = GitSnapshotter::new("/no/such/path/hopefully");
        let cancel = CancellationToken::new();
        let err = snapshotter.snapshot(&cancel).await.unwrap_err();
        assert!(matches!(err, GitSnapshotError::EmptyRepoDir(_)));
    }

    #[tokio::test]
    async fn snapshot_reads_branch_and_head() {
        let dir = init_repo().await;
        let snapshotter = GitSnapshotter::new(dir.path());
        let cancel = CancellationToken::new();
        let snap = snapshotter.snapshot(&cancel).await.unwrap();
        assert_eq!(snap.branch, "main");
        assert_eq!(snap.commit_count, 1);
        assert!(!snap.head.is_empty());
        assert_eq!(snap.changed_files, 0);
        assert!(!snap.uncommitted);
    }

    #[tokio::test]
    async fn snapshot_counts_uncommitted_changes() {
        let dir = init_repo().await;
        tokio::fs::write(dir.path().join("b.txt"), "two").await.unwrap();
        let snapshotter = GitSnapshotter::new(dir.path());
        let cancel = CancellationToken::new();
        let snap = snapshotter.snapshot(&cancel).await.unwrap();
        assert_eq!(snap.changed_files, 1);
        assert!(snap.uncommitted);
    }

    #[tokio::test]
    async fn snapshot_lists_sorted_branches() {
        let dir = init_repo().await;
        git(dir.path(), &["branch", "feature/b"]).await;
        git(dir.path(), &["branch", "bugfix"]).await;
        let snapshotter = GitSnapshotter::new(dir.path());
        let cancel = CancellationToken::new();
        let snap = snapshotter.snapshot(&cancel).await.unwrap();
        assert_eq!(snap.branches, vec!["bugfix", "feature/b", "main"]);
    }
}
