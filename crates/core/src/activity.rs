// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output classification data model.

use serde::{Deserialize, Serialize};

/// The closed set of activities a single output line can classify to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    TestRun,
    BuildResult,
    Error,
    ToolCall,
    FileEdit,
    CommandRun,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Activity::TestRun => "test_run",
            Activity::BuildResult => "build_result",
            Activity::Error => "error",
            Activity::ToolCall => "tool_call",
            Activity::FileEdit => "file_edit",
            Activity::CommandRun => "command_run",
        }
    }
}

/// Internal activity tags the progress monitor assigns to git-derived
/// events; these never come out of [`crate::activity::Activity`] because
/// they describe repository state transitions, not output lines.
pub mod git_activity {
    pub const GIT_SNAPSHOT: &str = "git_snapshot";
    pub const GIT_COMMIT: &str = "git_commit";
    pub const BRANCH_CREATED: &str = "branch_created";
    pub const FILE_CHANGE: &str = "file_change";
    pub const STALLED: &str = "stalled";
    pub const AGENT_STARTED: &str = "agent_started";
    pub const AGENT_EXITED: &str = "agent_exited";
}

/// The result of classifying one output line: `None` when the line carries
/// no meaningful signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub activity: Option<Activity>,
    pub detail: String,
    pub success: Option<bool>,
}

impl Classification {
    pub fn not_meaningful(detail: String) -> Self {
        Self { activity: None, detail, success: None }
    }

    pub fn meaningful(activity: Activity, detail: String, success: Option<bool>) -> Self {
        Self { activity: Some(activity), detail, success }
    }

    pub fn is_meaningful(&self) -> bool {
        self.activity.is_some()
    }
}
