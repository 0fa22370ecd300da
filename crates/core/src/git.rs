// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository snapshot data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A one-shot read of repository state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSnapshot {
    pub branch: String,
    pub head: String,
    pub head_time: DateTime<Utc>,
    pub changed_files: i64,
    pub uncommitted: bool,
    /// Sorted, de-duplicated local branch names.
    pub branches: Vec<String>,
    pub commit_count: i64,
}

impl GitSnapshot {
    /// Build a snapshot, enforcing `uncommitted ⇔ changed_files > 0` and
    /// sorting/de-duplicating the branch list.
    pub fn new(
        branch: String,
        head: String,
        head_time: DateTime<Utc>,
        changed_files: i64,
        mut branches: Vec<String>,
        commit_count: i64,
    ) -> Self {
        branches.sort();
        branches.dedup();
        Self {
            branch,
            head,
            head_time,
            changed_files,
            uncommitted: changed_files > 0,
            branches,
            commit_count,
        }
    }

    /// First 12 characters of `head`, for display in heartbeat events.
    pub fn short_head(&self) -> String {
        self.head.chars().take(12).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sorts_and_dedups_branches() {
        let snap = GitSnapshot::new(
            "main".into(),
            "abc123".into(),
            Utc::now(),
            0,
            vec!["feature/b".into(), "main".into(), "feature/b".into()],
            5,
        );
        assert_eq!(snap.branches, vec!["feature/b", "main"]);
        assert!(!snap.uncommitted);
    }

    #[test]
    fn changed_files_implies_uncommitted() {
        let snap = GitSnapshot::new("main".into(), "abc".into(), Utc::now(), 3, vec![], 1);
        assert!(snap.uncommitted);
    }

    #[test]
    fn short_head_truncates_to_twelve_chars() {
        let snap = GitSnapshot::new(
            "main".into(),
            "0123456789abcdef".into(),
            Utc::now(),
            0,
            vec![],
            1,
        );
        assert_eq!(snap.short_head(), "0123456789ab");
    }
}
