// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::{Config, HostKeyPolicy};

fn parse(args: &[&str]) -> Config {
    Config::parse_from(args)
}

#[test]
fn defaults_are_correct() -> anyhow::Result<()> {
    let config = parse(&["opsdash"]);
    config.validate()?;
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 5000);
    assert_eq!(config.log_capacity, 1000);
    assert_eq!(config.interpreter, "python3");
    assert_eq!(config.process_match, "python");
    assert_eq!(config.log_format, "json");
    assert_eq!(config.log_level, "info");
    assert_eq!(config.host_key_policy()?, HostKeyPolicy::AcceptAny);
    Ok(())
}

#[test]
#[serial_test::serial]
fn env_duration_defaults() {
    // These read env vars, so with no env set we get production defaults.
    let config = parse(&["opsdash"]);
    assert_eq!(config.shell_poll(), Duration::from_millis(50));
    assert_eq!(config.disconnect_wait(), Duration::from_secs(1));
    assert_eq!(config.stop_timeout(), Duration::from_secs(5));
    assert_eq!(config.stream_poll(), Duration::from_secs(1));
    assert_eq!(config.reap_interval(), Duration::from_secs(30));
    assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    assert_eq!(config.exec_timeout(), Duration::from_secs(10));
}

#[test]
#[serial_test::serial]
fn env_overrides_duration() {
    std::env::set_var("OPSDASH_SHELL_POLL_MS", "7");
    let config = parse(&["opsdash"]);
    let poll = config.shell_poll();
    std::env::remove_var("OPSDASH_SHELL_POLL_MS");
    assert_eq!(poll, Duration::from_millis(7));
}

#[test]
#[serial_test::serial]
fn field_override_beats_env() {
    std::env::set_var("OPSDASH_STOP_TIMEOUT_MS", "9999");
    let config = Config::test();
    let timeout = config.stop_timeout();
    std::env::remove_var("OPSDASH_STOP_TIMEOUT_MS");
    assert_eq!(timeout, Duration::from_millis(500));
}

#[yare::parameterized(
    zero_capacity   = { &["opsdash", "--log-capacity", "0"], "--log-capacity" },
    empty_interp    = { &["opsdash", "--interpreter", " "], "--interpreter" },
    bad_format      = { &["opsdash", "--log-format", "xml"], "invalid log format" },
    bad_policy      = { &["opsdash", "--host-key-policy", "yolo"], "invalid host key policy" },
    empty_token     = { &["opsdash", "--auth-token", ""], "--auth-token" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[yare::parameterized(
    accept_any  = { "accept-any", HostKeyPolicy::AcceptAny },
    known_hosts = { "known-hosts", HostKeyPolicy::KnownHosts },
    upper       = { "KNOWN-HOSTS", HostKeyPolicy::KnownHosts },
)]
fn host_key_policy_parses(input: &str, expected: HostKeyPolicy) {
    assert_eq!(input.parse::<HostKeyPolicy>().ok(), Some(expected));
}

#[test]
fn paths_derive_from_base_dir() {
    let config = parse(&["opsdash", "--base-dir", "/srv/ops"]);
    assert_eq!(config.logs_dir(), PathBuf::from("/srv/ops/script_logs"));
    assert_eq!(config.ssh_config_path(), PathBuf::from("/srv/ops/ssh_config.json"));
    assert_eq!(config.monitor_config_path(), PathBuf::from("/srv/ops/monitor_config.json"));
}

#[test]
fn explicit_paths_win() {
    let config =
        parse(&["opsdash", "--base-dir", "/srv/ops", "--logs-dir", "/var/log/ops"]);
    assert_eq!(config.logs_dir(), PathBuf::from("/var/log/ops"));
}
