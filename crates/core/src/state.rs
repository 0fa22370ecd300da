// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted supervisor state and the final run outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single supervisor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorStatus {
    Starting,
    Running,
    Stalled,
    Stopping,
    Stopped,
    Error,
}

/// The single JSON document describing supervisor status (`state.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorState {
    pub sprite: String,
    pub status: SupervisorStatus,
    pub supervisor_pid: u32,
    /// 0 when no child is currently running.
    pub agent_pid: u32,
    pub restarts: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity: String,
    #[serde(default)]
    pub stalled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub task: String,
}

impl SupervisorState {
    pub fn new(sprite: String, supervisor_pid: u32, task: String, now: DateTime<Utc>) -> Self {
        Self {
            sprite,
            status: SupervisorStatus::Starting,
            supervisor_pid,
            agent_pid: 0,
            restarts: 0,
            started_at: now,
            updated_at: now,
            last_heartbeat_at: None,
            last_progress_at: None,
            last_activity: String::new(),
            stalled: false,
            last_error: None,
            task,
        }
    }

    /// Check the persisted-document invariants from the data model.
    pub fn invariants_hold(&self) -> bool {
        if self.updated_at < self.started_at {
            return false;
        }
        let no_live_child_expected = matches!(
            self.status,
            SupervisorStatus::Starting | SupervisorStatus::Stopped | SupervisorStatus::Error
        );
        !(no_live_child_expected && self.agent_pid != 0)
    }
}

/// The terminal classification of a supervisor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Stopped,
    Interrupted,
    Error,
}

impl RunState {
    /// Process exit code contract from §3/§6.
    pub fn exit_code(self) -> i32 {
        match self {
            RunState::Stopped => 0,
            RunState::Interrupted => 130,
            RunState::Error => 1,
        }
    }
}

/// The outcome handed back from `Supervisor::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub state: RunState,
    pub restarts: u32,
    pub err: Option<String>,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }

    pub fn stopped(restarts: u32) -> Self {
        Self { state: RunState::Stopped, restarts, err: None }
    }

    pub fn interrupted(restarts: u32, err: Option<String>) -> Self {
        Self { state: RunState::Interrupted, restarts, err }
    }

    pub fn error(restarts: u32, err: impl Into<String>) -> Self {
        Self { state: RunState::Error, restarts, err: Some(err.into()) }
    }
}
