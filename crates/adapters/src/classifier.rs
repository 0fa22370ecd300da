// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure classification of a single line of agent output into an [`Activity`].

use sprited_core::{Activity, Classification};

/// Compatibility constant: detail is always truncated to this many characters.
const DETAIL_MAX_CHARS: usize = 240;

const TEST_RUNNER_MARKERS: &[&str] =
    &["go test", "cargo test", "pytest", "npm test", "yarn test", "jest", "running 1 test", "running tests"];

const BUILD_SUCCESS_MARKERS: &[&str] =
    &["build succeeded", "build successful", "compiling finished", "cargo build", "build finished", "compiled successfully"];

const FAILURE_MARKERS: &[&str] =
    &["error:", "build failed", "fatal:", "panicked at", "traceback (most recent call last)", "failed with exit code", "exception:"];

const TOOL_CALL_MARKERS: &[&str] = &["calling tool", "tool_use", "invoking tool", "function_call"];

const FILE_EDIT_MARKERS: &[&str] = &["editing file", "wrote to file", "applying patch", "diff --git", "created file"];

const COMMAND_RUN_MARKERS: &[&str] = &["$ ", "running command", "executing:", "shell:"];

/// Classify a single line of child output. Deterministic and side-effect free.
pub fn classify(line: &str, is_stderr: bool) -> Classification {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Classification::not_meaningful(String::new());
    }

    let detail = truncate(trimmed);
    let lower = trimmed.to_lowercase();

    if contains_any(&lower, TEST_RUNNER_MARKERS) {
        return Classification::meaningful(Activity::TestRun, detail, None);
    }
    if contains_any(&lower, BUILD_SUCCESS_MARKERS) {
        return Classification::meaningful(Activity::BuildResult, detail, Some(true));
    }
    if contains_any(&lower, FAILURE_MARKERS) || is_stderr {
        return Classification::meaningful(Activity::Error, detail, Some(false));
    }
    if contains_any(&lower, TOOL_CALL_MARKERS) {
        return Classification::meaningful(Activity::ToolCall, detail, None);
    }
    if contains_any(&lower, FILE_EDIT_MARKERS) {
        return Classification::meaningful(Activity::FileEdit, detail, None);
    }
    if contains_any(&lower, COMMAND_RUN_MARKERS) {
        return Classification::meaningful(Activity::CommandRun, detail, None);
    }

    Classification::not_meaningful(detail)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn truncate(line: &str) -> String {
    if line.chars().count() <= DETAIL_MAX_CHARS {
        line.to_string()
    } else {
        line.chars().take(DETAIL_MAX_CHARS).collect()
    }
}
