// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the child command line and environment for a given [`AgentConfig`].

use std::collections::HashMap;

use sprited_core::{AgentConfig, AgentKind};

/// A fully-resolved invocation: program name, positional+flag arguments, and
/// the environment to launch the child with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Build the argv and environment for launching `config.kind` with `prompt`.
///
/// Mirrors §6: prompt and model are always passed as distinct arguments,
/// never interpolated into a shell string.
pub fn build_invocation(config: &AgentConfig, prompt: &str) -> AgentInvocation {
    let program = config.kind.command().to_string();
    let args = match config.kind {
        AgentKind::Codex | AgentKind::KimiCode | AgentKind::Claude => build_cli_args(config, prompt),
        AgentKind::Opencode => build_opencode_args(config, prompt),
    };
    let env = build_env(config);

    AgentInvocation { program, args, env }
}

fn build_cli_args(config: &AgentConfig, prompt: &str) -> Vec<String> {
    let mut args = Vec::new();

    if config.yolo {
        if config.kind == AgentKind::Claude {
            args.push("--dangerously-skip-permissions".to_string());
        } else {
            args.push("--yolo".to_string());
        }
    }
    if config.full_auto {
        args.push("--full-auto".to_string());
    }
    if let Some(model) = &config.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    push_extra_flags(&mut args, config);
    args.push(prompt.to_string());
    args
}

fn build_opencode_args(config: &AgentConfig, prompt: &str) -> Vec<String> {
    let mut args = vec!["run".to_string(), "-m".to_string()];
    args.push(config.model.clone().unwrap_or_else(|| "default".to_string()));
    args.push("--agent".to_string());
    args.push("coder".to_string());

    push_extra_flags(&mut args, config);
    args.push(prompt.to_string());
    args
}

fn push_extra_flags(args: &mut Vec<String>, config: &AgentConfig) {
    for flag in &config.extra_flags {
        let trimmed = flag.trim();
        if !trimmed.is_empty() {
            args.push(trimmed.to_string());
        }
    }
}

/// Parent environment, overlaid with pass-through vars, overlaid with the
/// explicit `env` map (keys trimmed; last write wins).
fn build_env(config: &AgentConfig) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();

    for (key, value) in &config.pass_through_env {
        env.insert(key.trim().to_string(), value.clone());
    }
    for (key, value) in &config.env {
        env.insert(key.trim().to_string(), value.clone());
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprited_core::AgentAssignment;
    use std::collections::BTreeMap;

    fn base_config(kind: AgentKind) -> AgentConfig {
        AgentConfig {
            kind,
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
    fn claude_yolo_uses_dangerously_skip_permissions() {
        let mut config = base_config(AgentKind::Claude);
        config.yolo = true;
        let inv = build_invocation(&config, "fix the bug");
        assert_eq!(inv.program, "claude");
        assert_eq!(inv.args[0], "--dangerously-skip-permissions");
        assert_eq!(inv.args.last().unwrap(), "fix the bug");
    }

    #[test]
    fn codex_yolo_uses_yolo_flag() {
        let mut config = base_config(AgentKind::Codex);
        config.yolo = true;
        let inv = build_invocation(&config, "fix the bug");
        assert_eq!(inv.args[0], "--yolo");
    }

    #[test]
    fn model_and_full_auto_appear_in_order_before_extra_flags() {
        let mut config = base_config(AgentKind::Codex);
        config.full_auto = true;
        config.model = Some("gpt-5".into());
        config.extra_flags = vec!["  --verbose  ".into(), "".into()];
        let inv = build_invocation(&config, "do it");
        assert_eq!(inv.args, vec!["--full-auto", "--model", "gpt-5", "--verbose", "do it"]);
    }

    #[test]
    fn opencode_builds_run_args_with_default_model() {
        let config = base_config(AgentKind::Opencode);
        let inv = build_invocation(&config, "do it");
        assert_eq!(inv.program, "opencode");
        assert_eq!(inv.args, vec!["run", "-m", "default", "--agent", "coder", "do it"]);
    }

    #[test]
    fn opencode_uses_configured_model() {
        let mut config = base_config(AgentKind::Opencode);
        config.model = Some("kimi-k2".into());
        let inv = build_invocation(&config, "do it");
        assert_eq!(inv.args[2], "kimi-k2");
    }

    #[test]
    fn explicit_env_overrides_pass_through_env() {
        let mut config = base_config(AgentKind::Codex);
        config.pass_through_env.insert("API_KEY".into(), "from-pass-through".into());
        config.env.insert(" API_KEY ".into(), "from-explicit".into());
        let inv = build_invocation(&config, "do it");
        assert_eq!(inv.env.get("API_KEY"), Some(&"from-explicit".to_string()));
    }
}
