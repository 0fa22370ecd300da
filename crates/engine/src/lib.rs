// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sprited-engine: the supervisor runtime that ties the event journal,
//! output logger, state store, progress monitor, and heartbeat emitter
//! together into one run loop.

pub mod heartbeat;
pub mod journal;
pub mod output_logger;
pub mod progress_monitor;
pub mod state_store;
pub mod supervisor;

pub use heartbeat::{HeartbeatEmitter, HeartbeatSnapshot, HeartbeatSource};
pub use journal::{EventJournal, JournalError};
pub use output_logger::{OutputLogger, OutputLoggerError, Stream};
pub use progress_monitor::ProgressMonitor;
pub use supervisor::{Supervisor, SupervisorError, SupervisorTimers};
