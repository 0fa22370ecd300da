// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic heartbeat emission: samples process + git state on a fixed
//! tick and emits a `heartbeat` (or `error`) event.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sprited_core::event::EventBody;
use sprited_core::{Clock, Event};
use tokio_util::sync::CancellationToken;

use crate::journal::EventJournal;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// A point-in-time read of everything a `heartbeat` event reports.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatSnapshot {
    pub uptime_seconds: i64,
    pub agent_pid: i32,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub branch: String,
    pub last_commit: String,
    pub uncommitted_changes: Option<bool>,
}

/// Supplies heartbeat data. The supervisor implements this by combining
/// the process sampler (reading `agent_pid` from the persisted state) with
/// the progress monitor's latest git snapshot.
#[async_trait]
pub trait HeartbeatSource: Send + Sync {
    async fn sample(&self) -> Result<HeartbeatSnapshot, String>;
}

pub type HeartbeatCallback = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;

pub struct HeartbeatEmitter<C: Clock, S: HeartbeatSource> {
    sprite: String,
    interval: Duration,
    source: S,
    journal: Arc<EventJournal>,
    clock: C,
    on_emit: Option<HeartbeatCallback>,
}

impl<C: Clock, S: HeartbeatSource> HeartbeatEmitter<C, S> {
    pub fn new(
        sprite: impl Into<String>,
        interval: Option<Duration>,
        source: S,
        journal: Arc<EventJournal>,
        clock: C,
        on_emit: Option<HeartbeatCallback>,
    ) -> Self {
        Self {
            sprite: sprite.into(),
            interval: positive_or_default(interval, DEFAULT_HEARTBEAT_INTERVAL),
            source,
            journal,
            clock,
            on_emit,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    async fn tick(&self) {
        let now = self.clock.utc_now();
        match self.source.sample().await {
            Ok(snapshot) => {
                self.emit(Event {
                    timestamp: now,
                    sprite_name: self.sprite.clone(),
                    body: EventBody::Heartbeat {
                        uptime_seconds: snapshot.uptime_seconds,
                        agent_pid: snapshot.agent_pid,
                        cpu_percent: snapshot.cpu_percent,
                        memory_bytes: snapshot.memory_bytes,
                        branch: snapshot.branch,
                        last_commit: snapshot.last_commit,
                        uncommitted_changes: snapshot.uncommitted_changes,
                    },
                });
                if let Some(cb) = &self.on_emit {
                    cb(now);
                }
            }
            Err(message) => self.emit(Event {
                timestamp: now,
                sprite_name: self.sprite.clone(),
                body: EventBody::Error { code: "heartbeat_snapshot".into(), message },
            }),
        }
    }

    fn emit(&self, event: Event) {
        if let Err(err) = self.journal.emit(&event) {
            tracing::warn!(error = %err, "failed to emit heartbeat event");
        }
    }
}

fn positive_or_default(value: Option<Duration>, default: Duration) -> Duration {
    match value {
        Some(d) if !d.is_zero() => d,
        _ => default,
    }
}
