// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the sprite supervisor.
//!
//! Serializes as `{"timestamp": ..., "sprite_name": ..., "kind": "event:name", ...fields}`,
//! one object per line (see [`Event::marshal`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single journal entry: common header plus a tagged, variant-specific body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub sprite_name: String,
    #[serde(flatten)]
    pub body: EventBody,
}

/// The seven emittable event kinds, tagged on the wire by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventBody {
    Provision {
        persona: String,
    },
    Dispatch {
        task: String,
        repo: String,
        branch: String,
    },
    Progress {
        #[serde(default)]
        branch: String,
        #[serde(default)]
        commits: i64,
        #[serde(default)]
        files_changed: i64,
        activity: String,
        #[serde(default)]
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default)]
        last_commit: String,
        #[serde(default)]
        branch_created: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stalled: Option<bool>,
    },
    Heartbeat {
        uptime_seconds: i64,
        agent_pid: i32,
        cpu_percent: f64,
        memory_bytes: u64,
        #[serde(default)]
        branch: String,
        #[serde(default)]
        last_commit: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uncommitted_changes: Option<bool>,
    },
    Done {
        branch: String,
        pr: i64,
    },
    Blocked {
        reason: String,
    },
    Error {
        #[serde(default)]
        code: String,
        message: String,
    },
}

/// Failure conditions raised by [`Event::marshal`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event sprite_name must be non-empty")]
    EmptySpriteName,
    #[error("event timestamp must be non-zero")]
    ZeroTimestamp,
    #[error("{field} is required and must be non-empty for {kind} events")]
    MissingRequiredField { kind: &'static str, field: &'static str },
    #[error("event encoding produced an embedded newline")]
    EmbeddedNewline,
    #[error("failed to encode event as JSON: {0}")]
    Encode(String),
}

impl Event {
    /// Validate required fields per the data model, then encode as a single
    /// line of JSON terminated by `\n`.
    pub fn marshal(&self) -> Result<Vec<u8>, EventError> {
        self.validate()?;
        let mut line = serde_json::to_string(self).map_err(|e| EventError::Encode(e.to_string()))?;
        if line.contains('\n') {
            return Err(EventError::EmbeddedNewline);
        }
        line.push('\n');
        Ok(line.into_bytes())
    }

    /// Check the invariants from the data model without encoding.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.sprite_name.trim().is_empty() {
            return Err(EventError::EmptySpriteName);
        }
        if self.timestamp.timestamp_millis() == 0 {
            return Err(EventError::ZeroTimestamp);
        }
        match &self.body {
            EventBody::Dispatch { task, .. } if task.trim().is_empty() => {
                Err(EventError::MissingRequiredField { kind: "dispatch", field: "task" })
            }
            EventBody::Blocked { reason } if reason.trim().is_empty() => {
                Err(EventError::MissingRequiredField { kind: "blocked", field: "reason" })
            }
            EventBody::Error { message, .. } if message.trim().is_empty() => {
                Err(EventError::MissingRequiredField { kind: "error", field: "message" })
            }
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.body {
            EventBody::Provision { .. } => "provision",
            EventBody::Dispatch { .. } => "dispatch",
            EventBody::Progress { .. } => "progress",
            EventBody::Heartbeat { .. } => "heartbeat",
            EventBody::Done { .. } => "done",
            EventBody::Blocked { .. } => "blocked",
            EventBody::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
