// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{AuthMethod, ConnectionRecord, JsonStore, MonitorConfig, SshConfig};

fn record(name: &str) -> ConnectionRecord {
    ConnectionRecord {
        name: name.to_owned(),
        host: "10.0.0.5".to_owned(),
        port: 22,
        username: "ops".to_owned(),
        auth_method: AuthMethod::Password,
        password: Some("secret".to_owned()),
        key_file: None,
    }
}

#[test]
fn missing_file_loads_default() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store: JsonStore<MonitorConfig> = JsonStore::new(dir.path().join("monitor_config.json"));
    let config = store.load();
    assert_eq!(config.monitor_paths, vec!["."]);
    assert_eq!(config.exclude_patterns, vec!["monitor.py"]);
    Ok(())
}

#[test]
fn ensure_exists_writes_default_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ssh_config.json");
    let store: JsonStore<SshConfig> = JsonStore::new(&path);
    store.ensure_exists()?;
    assert!(path.exists());

    store.save(&SshConfig { connections: vec![record("db")] })?;
    store.ensure_exists()?;
    assert_eq!(store.load().connections.len(), 1);
    Ok(())
}

#[test]
fn save_then_load() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store: JsonStore<SshConfig> = JsonStore::new(dir.path().join("nested/ssh_config.json"));
    let doc = SshConfig { connections: vec![record("web"), record("db")] };
    store.save(&doc)?;
    assert_eq!(store.try_load()?, doc);
    Ok(())
}

#[test]
fn corrupt_file_falls_back_to_default() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("monitor_config.json");
    std::fs::write(&path, "{not json")?;
    let store: JsonStore<MonitorConfig> = JsonStore::new(&path);
    assert!(store.try_load().is_err());
    assert_eq!(store.load(), MonitorConfig::default());
    Ok(())
}

#[test]
fn record_defaults_port_and_method() -> anyhow::Result<()> {
    let record: ConnectionRecord =
        serde_json::from_str(r#"{"name":"a","host":"h","username":"u"}"#)?;
    assert_eq!(record.port, 22);
    assert_eq!(record.auth_method, AuthMethod::Password);
    assert!(record.password.is_none());
    Ok(())
}

#[test]
fn duplicate_names_detected() {
    let config = SshConfig { connections: vec![record("a"), record("b"), record("a"), record("a")] };
    assert_eq!(config.duplicate_names(), vec!["a"]);
    assert!(SshConfig { connections: vec![record("a")] }.duplicate_names().is_empty());
}
