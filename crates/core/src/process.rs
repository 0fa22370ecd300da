// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process resource usage data model.

use serde::{Deserialize, Serialize};

/// CPU and memory usage for a single process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessUsage {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

impl ProcessUsage {
    pub const ZERO: ProcessUsage = ProcessUsage { cpu_percent: 0.0, memory_bytes: 0 };
}

impl Default for ProcessUsage {
    fn default() -> Self {
        Self::ZERO
    }
}
