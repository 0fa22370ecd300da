// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor run loop: launches the agent, streams its output, reacts
//! to signals/stalls/exits, and drives shutdown with a grace period.

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use sprited_adapters::{build_invocation, GitSnapshotter, ProcessSampler};
use sprited_core::activity::git_activity;
use sprited_core::event::EventBody;
use sprited_core::{AgentConfig, Clock, Event, RunResult, RuntimePaths, SupervisorState, SupervisorStatus};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::heartbeat::{HeartbeatEmitter, HeartbeatSnapshot, HeartbeatSource};
use crate::journal::EventJournal;
use crate::output_logger::{OutputLogger, Stream};
use crate::progress_monitor::ProgressMonitor;
use crate::state_store;

const STDOUT_LINE_CAPACITY: usize = 2 * 1024 * 1024;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("runtime directory: {0}")]
    RuntimeDir(std::io::Error),
    #[error("event journal: {0}")]
    Journal(#[from] crate::journal::JournalError),
    #[error("output logger: {0}")]
    OutputLogger(#[from] crate::output_logger::OutputLoggerError),
    #[error("state store: {0}")]
    StateStore(#[from] state_store::StateStoreError),
}

/// Timers the supervisor loop consults; zero/negative values fall back to
/// each component's own default.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTimers {
    pub poll_interval: Option<Duration>,
    pub stall_timeout: Option<Duration>,
    pub heartbeat_interval: Option<Duration>,
    pub restart_delay: Duration,
    pub shutdown_grace_period: Duration,
}

impl Default for SupervisorTimers {
    fn default() -> Self {
        Self {
            poll_interval: None,
            stall_timeout: None,
            heartbeat_interval: None,
            restart_delay: Duration::from_secs(5),
            shutdown_grace_period: Duration::from_secs(10),
        }
    }
}

pub struct Supervisor<C: Clock> {
    sprite: String,
    agent: AgentConfig,
    paths: RuntimePaths,
    timers: SupervisorTimers,
    clock: C,
}

impl<C: Clock> Supervisor<C> {
    pub fn new(sprite: impl Into<String>, agent: AgentConfig, paths: RuntimePaths, timers: SupervisorTimers, clock: C) -> Self {
        Self { sprite: sprite.into(), agent, paths, timers, clock }
    }

    /// Run to completion, reacting to real `SIGINT`/`SIGTERM`.
    pub async fn run(&self, ctx: &CancellationToken) -> RunResult {
        self.run_with_signal(ctx, wait_for_termination_signal()).await
    }

    /// Core loop, parameterized over the termination-signal future so tests
    /// can substitute a channel instead of installing real signal handlers.
    pub async fn run_with_signal<F>(&self, ctx: &CancellationToken, signal: F) -> RunResult
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        if let Err(err) = self.agent.validate() {
            return RunResult::error(0, format!("validation: {err}"));
        }

        let (journal, logger, state, started_at) = match self.startup().await {
            Ok(bundle) => bundle,
            Err(err) => return RunResult::error(0, err.to_string()),
        };

        let child_scope = ctx.child_token();
        let (signal_tx, signal_rx) = oneshot::channel::<&'static str>();
        let mut signal_rx = Some(signal_rx);
        tokio::spawn(async move {
            let sig = signal.await;
            let _ = signal_tx.send(sig);
        });

        emit(
            &journal,
            Event {
                timestamp: self.clock.utc_now(),
                sprite_name: self.sprite.clone(),
                body: EventBody::Dispatch {
                    task: self.agent.assignment.task.clone(),
                    repo: self.agent.assignment.repo.clone(),
                    branch: self.agent.assignment.branch.clone(),
                },
            },
        );

        let snapshotter = GitSnapshotter::new(self.agent.workdir.clone());
        let state_for_progress = state.clone();
        let monitor = Arc::new(ProgressMonitor::new(
            self.sprite.clone(),
            snapshotter,
            self.timers.poll_interval,
            self.timers.stall_timeout,
            journal.clone(),
            self.clock.clone(),
            Some(Arc::new(move |activity: &str, at, stalled| {
                let state = state_for_progress.clone();
                let activity = activity.to_string();
                tokio::spawn(async move {
                    state
                        .mutate(|s| {
                            s.last_progress_at = Some(at);
                            s.last_activity = activity;
                            s.stalled = stalled;
                            if stalled {
                                s.status = SupervisorStatus::Stalled;
                            } else if s.status == SupervisorStatus::Stalled {
                                s.status = SupervisorStatus::Running;
                            }
                        })
                        .await;
                });
            })),
        ));
        let mut stall_signal = monitor.signals();

        let mut workers = JoinSet::new();
        {
            let monitor = monitor.clone();
            let scope = child_scope.clone();
            workers.spawn(async move { monitor.run(&scope).await });
        }

        let heartbeat_source = SupervisorHeartbeatSource {
            sampler: ProcessSampler::new(),
            monitor: monitor.clone(),
            state: state.clone(),
            started_at,
            clock: self.clock.clone(),
        };
        let state_for_heartbeat = state.clone();
        let heartbeat = Arc::new(HeartbeatEmitter::new(
            self.sprite.clone(),
            self.timers.heartbeat_interval,
            heartbeat_source,
            journal.clone(),
            self.clock.clone(),
            Some(Arc::new(move |at| {
                let state = state_for_heartbeat.clone();
                tokio::spawn(async move {
                    state.mutate(|s| s.last_heartbeat_at = Some(at)).await;
                });
            })),
        ));
        {
            let heartbeat = heartbeat.clone();
            let scope = child_scope.clone();
            workers.spawn(async move { heartbeat.run(&scope).await });
        }

        let result = self.main_loop(&child_scope, &journal, &logger, &monitor, &mut stall_signal, &mut signal_rx, &state).await;

        child_scope.cancel();
        workers.join_all().await;
        let _ = journal.close();
        let _ = logger.close();
        let _ = tokio::fs::remove_file(&self.paths.pid_file).await;

        result
    }

    /// Ensure the runtime directory, open the journal and logger, and
    /// persist the pid file and initial state document. Any failure here
    /// aborts the run before any worker starts.
    #[allow(clippy::type_complexity)]
    async fn startup(&self) -> Result<(Arc<EventJournal>, Arc<OutputLogger>, Arc<StateHandle<C>>, DateTime<Utc>), SupervisorError> {
        tokio::fs::create_dir_all(&self.paths.root).await.map_err(SupervisorError::RuntimeDir)?;

        let journal = Arc::new(EventJournal::open(&self.paths.event_log)?);
        let logger = Arc::new(OutputLogger::open(&self.paths.output_log)?);

        let supervisor_pid = std::process::id();
        state_store::write_pid(&self.paths.pid_file, supervisor_pid).await?;

        let started_at = self.clock.utc_now();
        let initial_state = SupervisorState::new(self.sprite.clone(), supervisor_pid, self.agent.assignment.task.clone(), started_at);
        if let Err(err) = state_store::write(&self.paths.state_file, &initial_state).await {
            let _ = tokio::fs::remove_file(&self.paths.pid_file).await;
            return Err(err.into());
        }

        let state = Arc::new(StateHandle::new(initial_state, self.paths.state_file.clone(), self.clock.clone()));
        Ok((journal, logger, state, started_at))
    }

    #[allow(clippy::too_many_arguments)]
    async fn main_loop(
        &self,
        child_scope: &CancellationToken,
        journal: &Arc<EventJournal>,
        logger: &Arc<OutputLogger>,
        monitor: &Arc<ProgressMonitor<C>>,
        stall_signal: &mut Option<oneshot::Receiver<()>>,
        signal_rx: &mut Option<oneshot::Receiver<&'static str>>,
        state: &Arc<StateHandle<C>>,
    ) -> RunResult {
        let mut restarts = 0u32;

        loop {
            let invocation = build_invocation(&self.agent, &self.agent.assignment.task);
            let mut cmd = tokio::process::Command::new(&invocation.program);
            cmd.args(&invocation.args)
                .current_dir(&self.agent.workdir)
                .envs(&invocation.env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            #[cfg(unix)]
            cmd.process_group(0);

            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(err) => {
                    restarts += 1;
                    state
                        .mutate(|s| {
                            s.status = SupervisorStatus::Error;
                            s.last_error = Some(format!("launch agent: {err}"));
                        })
                        .await;
                    self.emit_error(journal, "launch_failed", &format!("launch agent: {err}"));
                    if sleep_cancellable(self.timers.restart_delay, child_scope).await {
                        return RunResult::interrupted(restarts, Some("cancelled during restart delay".into()));
                    }
                    continue;
                }
            };

            let pid = child.id().unwrap_or(0) as i32;
            state
                .mutate(|s| {
                    s.agent_pid = pid as u32;
                    s.status = SupervisorStatus::Running;
                })
                .await;
            self.emit_progress(journal, git_activity::AGENT_STARTED, "agent started");

            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let mut stream_workers = JoinSet::new();
            if let Some(stdout) = stdout {
                stream_workers.spawn(stream_worker(stdout, Stream::Stdout, logger.clone(), monitor.clone(), self.clock.clone()));
            }
            if let Some(stderr) = stderr {
                stream_workers.spawn(stream_worker(stderr, Stream::Stderr, logger.clone(), monitor.clone(), self.clock.clone()));
            }

            // Wait for one of: a real termination signal, the caller's
            // context finishing, a stall (advisory only, the child keeps
            // running), or the child actually exiting. Signal arrival and
            // context-done are distinct causes with distinct reactions (see
            // §4.H), so each gets its own one-shot/token rather than sharing
            // `child_scope.cancelled()`.
            let exit_status = loop {
                tokio::select! {
                    biased;

                    result = async { signal_rx.as_mut().unwrap().await }, if signal_rx.is_some() => {
                        *signal_rx = None;
                        let sig = result.unwrap_or("signal");
                        child_scope.cancel();
                        state.mutate(|s| {
                            s.status = SupervisorStatus::Stopping;
                            s.last_error = Some("received signal".into());
                        }).await;
                        self.emit_error(journal, "signal", "received termination signal");
                        stop_agent(pid, self.timers.shutdown_grace_period).await;
                        let _ = child.wait().await;
                        stream_workers.join_all().await;
                        state.mutate(|s| { s.status = SupervisorStatus::Stopped; s.agent_pid = 0; }).await;
                        return RunResult::interrupted(restarts, Some(format!("interrupted by {sig}")));
                    }

                    _ = child_scope.cancelled() => {
                        state.mutate(|s| {
                            s.status = SupervisorStatus::Stopping;
                            s.last_error = Some("context done".into());
                        }).await;
                        stop_agent(pid, self.timers.shutdown_grace_period).await;
                        let _ = child.wait().await;
                        stream_workers.join_all().await;
                        state.mutate(|s| { s.status = SupervisorStatus::Stopped; s.agent_pid = 0; }).await;
                        return RunResult::interrupted(restarts, Some("context cancelled".into()));
                    }

                    result = async { stall_signal.as_mut().unwrap().await }, if stall_signal.is_some() => {
                        *stall_signal = None;
                        if result.is_ok() {
                            state.mutate(|s| {
                                s.status = SupervisorStatus::Stalled;
                                s.stalled = true;
                                s.last_error = Some("progress monitor reported a stall".into());
                            }).await;
                        }
                        continue;
                    }

                    status = child.wait() => break status,
                }
            };

            stream_workers.join_all().await;
            if child_scope.is_cancelled() {
                state.mutate(|s| { s.status = SupervisorStatus::Stopped; s.agent_pid = 0; }).await;
                return RunResult::interrupted(restarts, None);
            }

            restarts += 1;
            state.mutate(|s| s.agent_pid = 0).await;

            match exit_status {
                Ok(status) if status.success() => {
                    self.emit_progress(journal, git_activity::AGENT_EXITED, "agent exited cleanly");
                }
                Ok(status) => {
                    let message = format!("agent exited with {status}");
                    state.mutate(|s| { s.status = SupervisorStatus::Error; s.last_error = Some(message.clone()); }).await;
                    self.emit_error(journal, "agent_crash", &message);
                }
                Err(err) => {
                    let message = format!("wait for agent: {err}");
                    state.mutate(|s| { s.status = SupervisorStatus::Error; s.last_error = Some(message.clone()); }).await;
                    self.emit_error(journal, "agent_crash", &message);
                }
            }

            if sleep_cancellable(self.timers.restart_delay, child_scope).await {
                return RunResult::interrupted(restarts, Some("cancelled during restart delay".into()));
            }
        }
    }

    fn emit_progress(&self, journal: &EventJournal, activity: &str, detail: &str) {
        emit(
            journal,
            Event {
                timestamp: self.clock.utc_now(),
                sprite_name: self.sprite.clone(),
                body: EventBody::Progress {
                    branch: String::new(),
                    commits: 0,
                    files_changed: 0,
                    activity: activity.to_string(),
                    detail: detail.to_string(),
                    success: None,
                    last_commit: String::new(),
                    branch_created: String::new(),
                    stalled: None,
                },
            },
        );
    }

    fn emit_error(&self, journal: &EventJournal, code: &str, message: &str) {
        emit(
            journal,
            Event {
                timestamp: self.clock.utc_now(),
                sprite_name: self.sprite.clone(),
                body: EventBody::Error { code: code.to_string(), message: message.to_string() },
            },
        );
    }
}

fn emit(journal: &EventJournal, event: Event) {
    if let Err(err) = journal.emit(&event) {
        tracing::warn!(error = %err, "failed to emit supervisor event");
    }
}

/// Reads lines from `stream`, feeding each one to the output logger and the
/// progress monitor. Returns once the stream reaches EOF.
async fn stream_worker<C: Clock>(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    which: Stream,
    logger: Arc<OutputLogger>,
    monitor: Arc<ProgressMonitor<C>>,
    clock: C,
) {
    let mut lines = BufReader::with_capacity(STDOUT_LINE_CAPACITY, stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let _ = logger.write_line(clock.utc_now(), which, &line);
                monitor.observe_output(&line, which == Stream::Stderr);
            }
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(error = %err, "error reading agent output stream");
                return;
            }
        }
    }
}

/// `true` if the sleep was cut short by cancellation.
async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// `SIGTERM` the process group and child, escalating to `SIGKILL` after
/// `grace_period` if the caller hasn't already reaped it. A no-op for pid 0.
async fn stop_agent(pid: i32, grace_period: Duration) {
    if pid <= 0 {
        return;
    }
    let group = Pid::from_raw(pid);
    let _ = killpg(group, Signal::SIGTERM);
    let _ = kill(group, Signal::SIGTERM);

    tokio::time::sleep(grace_period).await;

    let _ = killpg(group, Signal::SIGKILL);
    let _ = kill(group, Signal::SIGKILL);
}

async fn wait_for_termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Serializes `mutate`-then-`persist` into one critical section, per the
/// state store's ownership contract.
struct StateHandle<C: Clock> {
    state: tokio::sync::Mutex<SupervisorState>,
    path: std::path::PathBuf,
    clock: C,
}

impl<C: Clock> StateHandle<C> {
    fn new(initial: SupervisorState, path: std::path::PathBuf, clock: C) -> Self {
        Self { state: tokio::sync::Mutex::new(initial), path, clock }
    }

    async fn mutate(&self, f: impl FnOnce(&mut SupervisorState)) {
        let mut guard = self.state.lock().await;
        f(&mut guard);
        guard.updated_at = self.clock.utc_now();
        if let Err(err) = state_store::write(&self.path, &guard).await {
            tracing::warn!(error = %err, "failed to persist supervisor state");
        }
    }

    async fn snapshot(&self) -> SupervisorState {
        self.state.lock().await.clone()
    }
}

struct SupervisorHeartbeatSource<C: Clock> {
    sampler: ProcessSampler,
    monitor: Arc<ProgressMonitor<C>>,
    state: Arc<StateHandle<C>>,
    started_at: DateTime<Utc>,
    clock: C,
}

#[async_trait]
impl<C: Clock> HeartbeatSource for SupervisorHeartbeatSource<C> {
    async fn sample(&self) -> Result<HeartbeatSnapshot, String> {
        let state = self.state.snapshot().await;
        let usage = self.sampler.sample(state.agent_pid as i64).await.map_err(|e| e.to_string())?;
        let (snapshot, has_snapshot) = self.monitor.snapshot();
        let uptime_seconds = self.clock.utc_now().signed_duration_since(self.started_at).num_seconds().max(0);

        Ok(HeartbeatSnapshot {
            uptime_seconds,
            agent_pid: state.agent_pid as i32,
            cpu_percent: usage.cpu_percent,
            memory_bytes: usage.memory_bytes,
            branch: snapshot.branch,
            last_commit: snapshot.short_head(),
            uncommitted_changes: has_snapshot.then_some(snapshot.uncommitted),
        })
    }
}
