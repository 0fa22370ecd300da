// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin binary wiring: parses arguments, builds an `AgentConfig`, and runs
//! the supervisor loop in the current process. No config files, no fleet
//! composition — that lives outside this crate's scope.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sprited_core::{AgentAssignment, AgentConfig, AgentKind, RuntimePaths, SystemClock};
use sprited_engine::{Supervisor, SupervisorTimers};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum AgentKindArg {
    Codex,
    KimiCode,
    Claude,
    Opencode,
}

impl From<AgentKindArg> for AgentKind {
    fn from(kind: AgentKindArg) -> Self {
        match kind {
            AgentKindArg::Codex => AgentKind::Codex,
            AgentKindArg::KimiCode => AgentKind::KimiCode,
            AgentKindArg::Claude => AgentKind::Claude,
            AgentKindArg::Opencode => AgentKind::Opencode,
        }
    }
}

/// Supervise one coding-agent child process.
#[derive(Debug, Parser)]
#[command(name = "sprited", version, about)]
struct Cli {
    /// Identifies this run in the event journal.
    #[arg(long)]
    sprite: String,

    /// Which agent backend to launch.
    #[arg(long, value_enum)]
    kind: AgentKindArg,

    /// Persona label recorded on `provision`/state (not currently emitted
    /// as its own event; carried for forward compatibility).
    #[arg(long, default_value = "default")]
    persona: String,

    /// The task prompt handed to the agent.
    #[arg(long)]
    task: String,

    /// Repository identifier, e.g. `owner/repo`.
    #[arg(long)]
    repo: String,

    /// Branch the agent is expected to work on.
    #[arg(long)]
    branch: String,

    /// Working directory the agent is launched in; also the git
    /// repository the progress monitor polls.
    #[arg(long)]
    workdir: String,

    /// Pass `--yolo`/`--dangerously-skip-permissions` to the agent.
    #[arg(long)]
    yolo: bool,

    /// Pass `--full-auto` to the agent.
    #[arg(long)]
    full_auto: bool,

    /// Explicit model override.
    #[arg(long)]
    model: Option<String>,

    /// Extra flags appended verbatim before the prompt. May repeat.
    #[arg(long = "extra-flag")]
    extra_flags: Vec<String>,

    /// Names of parent-environment variables to pass through. May repeat.
    #[arg(long = "pass-through-env")]
    pass_through_env: Vec<String>,

    /// Explicit `KEY=VALUE` environment overlay. May repeat.
    #[arg(long = "env")]
    env: Vec<String>,

    #[arg(long, default_value_t = 20)]
    poll_interval_secs: u64,

    #[arg(long, default_value_t = 600)]
    stall_timeout_secs: u64,

    #[arg(long, default_value_t = 60)]
    heartbeat_interval_secs: u64,

    #[arg(long, default_value_t = 5)]
    restart_delay_secs: u64,

    #[arg(long, default_value_t = 10)]
    shutdown_grace_period_secs: u64,
}

fn parse_env_pair(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw.split_once('=').with_context(|| format!("invalid --env entry {raw:?}, expected KEY=VALUE"))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn build_agent_config(cli: &Cli) -> Result<AgentConfig> {
    let mut pass_through_env = BTreeMap::new();
    for name in &cli.pass_through_env {
        let value = std::env::var(name).unwrap_or_default();
        pass_through_env.insert(name.trim().to_string(), value);
    }

    let mut env = BTreeMap::new();
    for raw in &cli.env {
        let (key, value) = parse_env_pair(raw)?;
        env.insert(key, value);
    }

    Ok(AgentConfig {
        kind: cli.kind.into(),
        persona: cli.persona.clone(),
        assignment: AgentAssignment { task: cli.task.clone(), repo: cli.repo.clone(), branch: cli.branch.clone() },
        workdir: cli.workdir.clone(),
        yolo: cli.yolo,
        full_auto: cli.full_auto,
        model: cli.model.clone(),
        extra_flags: cli.extra_flags.clone(),
        pass_through_env,
        env,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?)).init();

    let cli = Cli::parse();
    let agent = build_agent_config(&cli)?;
    let paths = RuntimePaths::new(&cli.workdir);
    let timers = SupervisorTimers {
        poll_interval: Some(Duration::from_secs(cli.poll_interval_secs)),
        stall_timeout: Some(Duration::from_secs(cli.stall_timeout_secs)),
        heartbeat_interval: Some(Duration::from_secs(cli.heartbeat_interval_secs)),
        restart_delay: Duration::from_secs(cli.restart_delay_secs),
        shutdown_grace_period: Duration::from_secs(cli.shutdown_grace_period_secs),
    };

    let supervisor = Supervisor::new(cli.sprite.clone(), agent, paths, timers, SystemClock);
    let ctx = CancellationToken::new();
    let result = supervisor.run(&ctx).await;

    if let Some(err) = &result.err {
        tracing::warn!(error = %err, "run ended with an error");
    }
    std::process::exit(result.exit_code());
}
