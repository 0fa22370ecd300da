// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Polls the git snapshotter, absorbs classified agent output, emits
//! `progress`/`blocked` events, and raises a one-shot stall signal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sprited_adapters::{classify, GitSnapshotter};
use sprited_core::activity::git_activity;
use sprited_core::event::EventBody;
use sprited_core::{Clock, Event, GitSnapshot};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::journal::EventJournal;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Fired on every meaningful activity transition (including the advisory
/// first-snapshot callback). `stalled` reflects the monitor's state *after*
/// this activity was absorbed.
pub type ActivityCallback = Arc<dyn Fn(&str, DateTime<Utc>, bool) + Send + Sync>;

struct MonitorState {
    snapshot: Option<GitSnapshot>,
    first_snapshot_at: Option<DateTime<Utc>>,
    last_git_activity: Option<DateTime<Utc>>,
    last_output_activity: Option<DateTime<Utc>>,
    stalled: bool,
}

impl MonitorState {
    fn latest_activity(&self) -> Option<DateTime<Utc>> {
        [self.last_git_activity, self.last_output_activity, self.first_snapshot_at]
            .into_iter()
            .flatten()
            .max()
    }
}

pub struct ProgressMonitor<C: Clock> {
    sprite: String,
    snapshotter: GitSnapshotter,
    poll_interval: Duration,
    stall_timeout: Duration,
    clock: C,
    journal: Arc<EventJournal>,
    on_activity: Option<ActivityCallback>,
    state: RwLock<MonitorState>,
    stall_tx: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
    stall_rx: parking_lot::Mutex<Option<oneshot::Receiver<()>>>,
}

impl<C: Clock> ProgressMonitor<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sprite: impl Into<String>,
        snapshotter: GitSnapshotter,
        poll_interval: Option<Duration>,
        stall_timeout: Option<Duration>,
        journal: Arc<EventJournal>,
        clock: C,
        on_activity: Option<ActivityCallback>,
    ) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            sprite: sprite.into(),
            snapshotter,
            poll_interval: positive_or_default(poll_interval, DEFAULT_POLL_INTERVAL),
            stall_timeout: positive_or_default(stall_timeout, DEFAULT_STALL_TIMEOUT),
            clock,
            journal,
            on_activity,
            state: RwLock::new(MonitorState {
                snapshot: None,
                first_snapshot_at: None,
                last_git_activity: None,
                last_output_activity: None,
                stalled: false,
            }),
            stall_tx: parking_lot::Mutex::new(Some(tx)),
            stall_rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    /// Returns the one-shot stall receiver; `None` if already taken.
    pub fn signals(&self) -> Option<oneshot::Receiver<()>> {
        self.stall_rx.lock().take()
    }

    pub fn snapshot(&self) -> (GitSnapshot, bool) {
        let state = self.state.read();
        match &state.snapshot {
            Some(snap) => (snap.clone(), true),
            None => (empty_snapshot(), false),
        }
    }

    pub fn last_activity_time(&self) -> Option<DateTime<Utc>> {
        let state = self.state.read();
        [state.last_git_activity, state.last_output_activity].into_iter().flatten().max()
    }

    /// Classify `line`; if meaningful, clear the stall and emit a `progress` event.
    pub fn observe_output(&self, line: &str, is_stderr: bool) {
        let classification = classify(line, is_stderr);
        if !classification.is_meaningful() {
            return;
        }
        let now = self.clock.utc_now();
        let branch = {
            let mut state = self.state.write();
            state.last_output_activity = Some(now);
            state.stalled = false;
            state.snapshot.as_ref().map(|s| s.branch.clone()).unwrap_or_default()
        };

        let activity = classification.activity.expect("checked meaningful above");
        self.emit_progress(now, branch, activity.as_str(), &classification.detail, classification.success, String::new(), None);
        self.fire_callback(activity.as_str(), now, false);
    }

    /// Run one immediate poll, then poll every `poll_interval` until cancelled.
    pub async fn run(&self, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.poll(cancel).await,
            }
        }
    }

    pub async fn poll(&self, cancel: &CancellationToken) {
        let new_snapshot = match self.snapshotter.snapshot(cancel).await {
            Ok(snap) => snap,
            Err(err) => {
                self.emit_error(git_activity::GIT_SNAPSHOT, &err.to_string());
                return;
            }
        };

        let now = self.clock.utc_now();
        let mut emit_plan = EmitPlan::default();

        {
            let mut state = self.state.write();
            if state.snapshot.is_none() {
                state.snapshot = Some(new_snapshot);
                state.first_snapshot_at = Some(now);
                state.last_git_activity = Some(now);
                emit_plan.first_snapshot = true;
            } else {
                let previous = state.snapshot.as_ref().expect("checked above").clone();

                let commit_changed = previous.head != new_snapshot.head;
                let file_changed =
                    previous.changed_files != new_snapshot.changed_files || previous.uncommitted != new_snapshot.uncommitted;
                let mut branches_added: Vec<String> =
                    new_snapshot.branches.iter().filter(|b| !previous.branches.contains(b)).cloned().collect();
                branches_added.sort();

                if commit_changed || file_changed || !branches_added.is_empty() {
                    state.last_git_activity = Some(now);
                    state.stalled = false;
                }

                let latest_activity = state.latest_activity().unwrap_or(now);
                let stall_duration = chrono::Duration::from_std(self.stall_timeout).unwrap_or(chrono::Duration::zero());
                if !state.stalled && now.signed_duration_since(latest_activity) >= stall_duration {
                    state.stalled = true;
                    emit_plan.newly_stalled = true;
                }

                emit_plan.commit_changed = commit_changed;
                emit_plan.file_changed = file_changed;
                emit_plan.branches_added = branches_added;
                emit_plan.branch = new_snapshot.branch.clone();
                emit_plan.last_commit = new_snapshot.head.clone();

                state.snapshot = Some(new_snapshot);
            }
        }

        self.apply_emit_plan(emit_plan, now);
    }

    fn apply_emit_plan(&self, plan: EmitPlan, now: DateTime<Utc>) {
        if plan.first_snapshot {
            self.fire_callback(git_activity::GIT_SNAPSHOT, now, false);
            return;
        }

        if plan.commit_changed {
            self.emit_progress(
                now,
                plan.branch.clone(),
                git_activity::GIT_COMMIT,
                &format!("new commit {}", short(&plan.last_commit)),
                None,
                String::new(),
                Some(plan.last_commit.clone()),
            );
            self.fire_callback(git_activity::GIT_COMMIT, now, false);
        }

        for branch in &plan.branches_added {
            self.emit_progress(
                now,
                plan.branch.clone(),
                git_activity::BRANCH_CREATED,
                &format!("branch created: {branch}"),
                None,
                branch.clone(),
                None,
            );
            self.fire_callback(git_activity::BRANCH_CREATED, now, false);
        }

        if plan.file_changed {
            self.emit_progress(now, plan.branch.clone(), git_activity::FILE_CHANGE, "working tree changed", None, String::new(), None);
            self.fire_callback(git_activity::FILE_CHANGE, now, false);
        }

        if plan.newly_stalled {
            let reason = format!("stalled: no git or output activity for {}s", self.stall_timeout.as_secs());
            self.emit_event(Event {
                timestamp: now,
                sprite_name: self.sprite.clone(),
                body: EventBody::Blocked { reason: reason.clone() },
            });
            self.fire_callback("blocked", now, true);

            self.emit_progress(now, plan.branch.clone(), git_activity::STALLED, &reason, None, String::new(), None);
            self.fire_callback(git_activity::STALLED, now, true);

            if let Some(tx) = self.stall_tx.lock().take() {
                let _ = tx.send(());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_progress(
        &self,
        now: DateTime<Utc>,
        branch: String,
        activity: &str,
        detail: &str,
        success: Option<bool>,
        branch_created: String,
        last_commit: Option<String>,
    ) {
        self.emit_event(Event {
            timestamp: now,
            sprite_name: self.sprite.clone(),
            body: EventBody::Progress {
                branch,
                commits: 0,
                files_changed: 0,
                activity: activity.to_string(),
                detail: detail.to_string(),
                success,
                last_commit: last_commit.unwrap_or_default(),
                branch_created,
                stalled: None,
            },
        });
    }

    fn emit_error(&self, code: &str, message: &str) {
        self.emit_event(Event {
            timestamp: self.clock.utc_now(),
            sprite_name: self.sprite.clone(),
            body: EventBody::Error { code: code.to_string(), message: message.to_string() },
        });
    }

    fn emit_event(&self, event: Event) {
        if let Err(err) = self.journal.emit(&event) {
            tracing::warn!(error = %err, "failed to emit progress monitor event");
        }
    }

    fn fire_callback(&self, activity: &str, at: DateTime<Utc>, stalled: bool) {
        if let Some(cb) = &self.on_activity {
            cb(activity, at, stalled);
        }
    }
}

#[derive(Default)]
struct EmitPlan {
    first_snapshot: bool,
    commit_changed: bool,
    file_changed: bool,
    newly_stalled: bool,
    branches_added: Vec<String>,
    branch: String,
    last_commit: String,
}

fn positive_or_default(value: Option<Duration>, default: Duration) -> Duration {
    match value {
        Some(d) if !d.is_zero() => d,
        _ => default,
    }
}

fn short(head: &str) -> String {
    head.chars().take(12).collect()
}

fn empty_snapshot() -> GitSnapshot {
    GitSnapshot::new(String::new(), String::new(), DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default(), 0, vec![], 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprited_core::{FakeClock, SystemClock};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn journal(dir: &TempDir) -> Arc<EventJournal> {
        Arc::new(EventJournal::open(dir.path().join("events.jsonl")).unwrap())
    }

    async fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            std::process::Command::new("git").current_dir(dir.path()).args(args).status().unwrap()
        };
        run(&["init", "-q", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn first_poll_fires_advisory_callback_without_progress_event() {
        let repo = init_repo().await;
        let events_dir = TempDir::new().unwrap();
        let j = journal(&events_dir);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let monitor = ProgressMonitor::new(
            "sprite-1",
            GitSnapshotter::new(repo.path()),
            None,
            None,
            j.clone(),
            SystemClock,
            Some(Arc::new(move |activity: &str, _at, _stalled| {
                assert_eq!(activity, git_activity::GIT_SNAPSHOT);
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );
        monitor.poll(&CancellationToken::new()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let (_, ok) = monitor.snapshot();
        assert!(ok);

        let log = std::fs::read_to_string(events_dir.path().join("events.jsonl")).unwrap();
        assert!(log.is_empty(), "first snapshot must not emit a journal event");
    }

    #[tokio::test]
    async fn detects_branch_creation_between_polls() {
        let repo = init_repo().await;
        let events_dir = TempDir::new().unwrap();
        let j = journal(&events_dir);
        let monitor = ProgressMonitor::new(
            "sprite-1",
            GitSnapshotter::new(repo.path()),
            None,
            None,
            j.clone(),
            SystemClock,
            None,
        );
        let cancel = CancellationToken::new();
        monitor.poll(&cancel).await;

        std::process::Command::new("git").current_dir(repo.path()).args(["branch", "feature/auth"]).status().unwrap();
        std::process::Command::new("git").current_dir(repo.path()).args(["branch", "bugfix"]).status().unwrap();
        monitor.poll(&cancel).await;

        let log = std::fs::read_to_string(events_dir.path().join("events.jsonl")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"branch_created\":\"bugfix\""));
        assert!(lines[1].contains("\"branch_created\":\"feature/auth\""));
    }

    #[tokio::test]
    async fn stall_signal_fires_exactly_once() {
        let repo = init_repo().await;
        let events_dir = TempDir::new().unwrap();
        let j = journal(&events_dir);
        let clock = FakeClock::new();
        let monitor = ProgressMonitor::new(
            "sprite-1",
            GitSnapshotter::new(repo.path()),
            Some(Duration::from_millis(1)),
            Some(Duration::from_secs(300)),
            j.clone(),
            clock.clone(),
            None,
        );
        let cancel = CancellationToken::new();
        let mut signals = monitor.signals().expect("signal receiver available once");

        monitor.poll(&cancel).await; // t=0, first snapshot
        clock.advance(Duration::from_secs(2));
        monitor.poll(&cancel).await; // t=2s, no change
        clock.advance(Duration::from_secs(6 * 60));
        monitor.poll(&cancel).await; // t=6m2s, stalled

        signals.try_recv().expect("stall signal delivered");

        let log = std::fs::read_to_string(events_dir.path().join("events.jsonl")).unwrap();
        let blocked_count = log.lines().filter(|l| l.contains("\"kind\":\"blocked\"")).count();
        let stalled_progress_count =
            log.lines().filter(|l| l.contains("\"kind\":\"progress\"") && l.contains("\"activity\":\"stalled\"")).count();
        assert_eq!(blocked_count, 1);
        assert_eq!(stalled_progress_count, 1);
    }

    #[tokio::test]
    async fn observe_output_clears_stall_and_emits_progress() {
        let repo = init_repo().await;
        let events_dir = TempDir::new().unwrap();
        let j = journal(&events_dir);
        let monitor = ProgressMonitor::new(
            "sprite-1",
            GitSnapshotter::new(repo.path()),
            None,
            None,
            j.clone(),
            SystemClock,
            None,
        );
        monitor.observe_output("error: build failed", false);
        let log = std::fs::read_to_string(events_dir.path().join("events.jsonl")).unwrap();
        assert!(log.contains("\"activity\":\"error\""));
    }
}
