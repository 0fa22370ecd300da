// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration and assignment data model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The recognized coding-agent backends a supervisor can launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Codex,
    KimiCode,
    Claude,
    Opencode,
}

impl AgentKind {
    pub fn command(self) -> &'static str {
        match self {
            AgentKind::Codex => "codex",
            AgentKind::KimiCode => "kimi-code",
            AgentKind::Claude => "claude",
            AgentKind::Opencode => "opencode",
        }
    }
}

/// The task this run dispatches to the agent: what to do and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAssignment {
    pub task: String,
    pub repo: String,
    pub branch: String,
}

/// Everything needed to spawn and supervise one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub kind: AgentKind,
    pub persona: String,
    pub assignment: AgentAssignment,
    pub workdir: String,
    /// Permission-bypass flag: `--dangerously-skip-permissions` (claude) or
    /// `--yolo` (codex/kimi-code). Has no effect on `opencode`.
    #[serde(default)]
    pub yolo: bool,
    /// `--full-auto`. Has no effect on `opencode`.
    #[serde(default)]
    pub full_auto: bool,
    #[serde(default)]
    pub model: Option<String>,
    /// Extra flags appended verbatim (trimmed, empties skipped) before the prompt.
    #[serde(default)]
    pub extra_flags: Vec<String>,
    /// Variables copied from a configured source and overlaid on the parent
    /// environment before the explicit `env` map.
    #[serde(default)]
    pub pass_through_env: BTreeMap<String, String>,
    /// Explicit environment overlay; highest precedence, keys trimmed.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Failures surfaced while validating an [`AgentConfig`] before dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("assignment task prompt is empty")]
    EmptyTask,
    #[error("assignment repo is empty")]
    EmptyRepo,
}

impl AgentConfig {
    /// Enforce the preconditions a supervisor checks before dispatching:
    /// non-empty task prompt and repo. Branch and workdir are not part of
    /// this precondition.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.assignment.task.trim().is_empty() {
            return Err(ValidationError::EmptyTask);
        }
        if self.assignment.repo.trim().is_empty() {
            return Err(ValidationError::EmptyRepo);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig {
            kind: AgentKind::Codex,
            persona: "builder".into(),
            assignment: AgentAssignment {
                task: "fix the bug".into(),
                repo: "owner/repo".into(),
                branch: "agent/fix".into(),
            },
            workdir: "/work/sprite-1".into(),
            yolo: false,
            full_auto: false,
            model: None,
            extra_flags: Vec::new(),
            pass_through_env: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_task() {
        let mut cfg = config();
        cfg.assignment.task = "  ".into();
        assert_eq!(cfg.validate().unwrap_err(), ValidationError::EmptyTask);
    }

    #[test]
    fn validate_rejects_empty_repo() {
        let mut cfg = config();
        cfg.assignment.repo = "".into();
        assert_eq!(cfg.validate().unwrap_err(), ValidationError::EmptyRepo);
    }

    #[test]
    fn validate_accepts_empty_branch_and_workdir() {
        let mut cfg = config();
        cfg.assignment.branch = "".into();
        cfg.workdir = "".into();
        assert!(cfg.validate().is_ok(), "branch/workdir are not part of the dispatch precondition");
    }

    #[test]
    fn command_maps_each_kind() {
        assert_eq!(AgentKind::Codex.command(), "codex");
        assert_eq!(AgentKind::KimiCode.command(), "kimi-code");
        assert_eq!(AgentKind::Claude.command(), "claude");
        assert_eq!(AgentKind::Opencode.command(), "opencode");
    }
}
