// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// How the remote shell client treats server host keys.
///
/// - `AcceptAny`: trust on first use. Every key is accepted and its
///   fingerprint logged at warn level.
/// - `KnownHosts`: verify against `~/.ssh/known_hosts`, rejecting unknown or
///   mismatched keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    #[default]
    AcceptAny,
    KnownHosts,
}

impl std::fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AcceptAny => f.write_str("accept-any"),
            Self::KnownHosts => f.write_str("known-hosts"),
        }
    }
}

impl std::str::FromStr for HostKeyPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept-any" => Ok(Self::AcceptAny),
            "known-hosts" => Ok(Self::KnownHosts),
            other => anyhow::bail!("invalid host key policy: {other}"),
        }
    }
}

/// Operations dashboard: local scripts, system resources and remote shells.
#[derive(Debug, Parser)]
#[command(name = "opsdash", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "OPSDASH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "OPSDASH_PORT", default_value = "5000")]
    pub port: u16,

    /// Base directory; relative monitor paths resolve against it.
    #[arg(long, env = "OPSDASH_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Directory that receives one log file per launched script.
    #[arg(long, env = "OPSDASH_LOGS_DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Saved SSH connection list.
    #[arg(long, env = "OPSDASH_SSH_CONFIG")]
    pub ssh_config: Option<PathBuf>,

    /// Monitored paths and exclude patterns.
    #[arg(long, env = "OPSDASH_MONITOR_CONFIG")]
    pub monitor_config: Option<PathBuf>,

    /// Bearer token for API authentication.
    #[arg(long, env = "OPSDASH_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "OPSDASH_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "OPSDASH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Records retained in memory per launched script.
    #[arg(long, env = "OPSDASH_LOG_CAPACITY", default_value = "1000")]
    pub log_capacity: usize,

    /// Program used to launch scripts.
    #[arg(long, env = "OPSDASH_INTERPRETER", default_value = "python3")]
    pub interpreter: String,

    /// Host key policy: accept-any, known-hosts.
    #[arg(long, env = "OPSDASH_HOST_KEY_POLICY", default_value = "accept-any")]
    pub host_key_policy: String,

    /// Substring matched against process names when listing processes.
    #[arg(long, env = "OPSDASH_PROCESS_MATCH", default_value = "python")]
    pub process_match: String,

    // -- Duration overrides (skip from CLI; set in Config::test()) --------
    #[clap(skip)]
    pub shell_poll_ms: Option<u64>,
    #[clap(skip)]
    pub disconnect_wait_ms: Option<u64>,
    #[clap(skip)]
    pub stop_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub stream_poll_ms: Option<u64>,
    #[clap(skip)]
    pub reap_interval_ms: Option<u64>,
    #[clap(skip)]
    pub connect_timeout_ms: Option<u64>,
    #[clap(skip)]
    pub exec_timeout_ms: Option<u64>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.log_capacity == 0 {
            anyhow::bail!("--log-capacity must be at least 1");
        }
        if self.interpreter.trim().is_empty() {
            anyhow::bail!("--interpreter must not be empty");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        if matches!(&self.auth_token, Some(t) if t.is_empty()) {
            anyhow::bail!("--auth-token must not be empty when set");
        }
        self.host_key_policy()?;
        Ok(())
    }

    // -- Tuning knobs (field override → env var → compiled default) --------

    duration_field!(shell_poll, shell_poll_ms, "OPSDASH_SHELL_POLL_MS", 50);
    duration_field!(disconnect_wait, disconnect_wait_ms, "OPSDASH_DISCONNECT_WAIT_MS", 1_000);
    duration_field!(stop_timeout, stop_timeout_ms, "OPSDASH_STOP_TIMEOUT_MS", 5_000);
    duration_field!(stream_poll, stream_poll_ms, "OPSDASH_STREAM_POLL_MS", 1_000);
    duration_field!(reap_interval, reap_interval_ms, "OPSDASH_REAP_INTERVAL_MS", 30_000);
    duration_field!(connect_timeout, connect_timeout_ms, "OPSDASH_CONNECT_TIMEOUT_MS", 10_000);
    duration_field!(exec_timeout, exec_timeout_ms, "OPSDASH_EXEC_TIMEOUT_MS", 10_000);

    /// Parse the host key policy string into an enum.
    pub fn host_key_policy(&self) -> anyhow::Result<HostKeyPolicy> {
        self.host_key_policy.parse()
    }

    pub fn base_dir(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.logs_dir.clone().unwrap_or_else(|| self.base_dir().join("script_logs"))
    }

    pub fn ssh_config_path(&self) -> PathBuf {
        self.ssh_config.clone().unwrap_or_else(|| self.base_dir().join("ssh_config.json"))
    }

    pub fn monitor_config_path(&self) -> PathBuf {
        self.monitor_config.clone().unwrap_or_else(|| self.base_dir().join("monitor_config.json"))
    }

    /// Build a minimal `Config` for tests (port 0, fast timings).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            base_dir: None,
            logs_dir: None,
            ssh_config: None,
            monitor_config: None,
            auth_token: None,
            log_format: "json".into(),
            log_level: "debug".into(),
            log_capacity: 1000,
            interpreter: "python3".into(),
            host_key_policy: "accept-any".into(),
            process_match: "python".into(),
            shell_poll_ms: Some(10),
            disconnect_wait_ms: Some(500),
            stop_timeout_ms: Some(500),
            stream_poll_ms: Some(20),
            reap_interval_ms: Some(50),
            connect_timeout_ms: Some(1_000),
            exec_timeout_ms: Some(1_000),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
