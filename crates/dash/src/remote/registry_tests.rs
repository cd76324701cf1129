// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::SessionRegistry;
use crate::ansi::AnsiFilter;
use crate::remote::{
    ConnectTarget, Credential, RemoteError, RemoteSession, SessionSettings, ShellState,
    TransportState,
};
use crate::test_support::MockRemote;

fn session(id: &str, remote: &MockRemote) -> anyhow::Result<Arc<RemoteSession>> {
    let target = ConnectTarget {
        host: format!("{id}.internal"),
        port: 22,
        username: "ops".to_owned(),
        credential: Credential::Password("secret".to_owned()),
    };
    let settings = SessionSettings {
        poll_interval: Duration::from_millis(10),
        disconnect_wait: Duration::from_millis(500),
        exec_timeout: Duration::from_millis(500),
    };
    Ok(Arc::new(RemoteSession::new(
        id,
        target,
        Arc::new(remote.clone()),
        Arc::new(AnsiFilter::new()?),
        settings,
    )))
}

#[tokio::test]
async fn replacing_disconnects_previous_once() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let registry = SessionRegistry::new();

    let first = session("web", &remote)?;
    first.connect().await?;
    let (tx, _rx) = mpsc::channel(8);
    first.open_shell(tx).await?;
    registry.put(Arc::clone(&first)).await;

    let second = session("web", &remote)?;
    second.connect().await?;
    registry.put(Arc::clone(&second)).await;

    assert_eq!(remote.closes(), 1);
    assert!(!first.reader_running().await);
    assert_eq!(first.shell_state(), ShellState::Closed);
    assert_eq!(first.transport_state(), TransportState::Disconnected { error: None });
    assert_eq!(registry.len(), 1);
    assert!(Arc::ptr_eq(&registry.get("web")?, &second));
    Ok(())
}

#[tokio::test]
async fn remove_disconnects_and_forgets() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let registry = SessionRegistry::new();
    let web = session("web", &remote)?;
    web.connect().await?;
    registry.put(web).await;

    registry.remove("web").await?;
    assert_eq!(remote.closes(), 1);
    assert!(!registry.contains("web"));
    assert_eq!(registry.remove("web").await, Err(RemoteError::SessionNotFound("web".to_owned())));
    crate::assert_err_contains!(registry.get("web"), "SSH session not found");
    Ok(())
}

#[tokio::test]
async fn list_sorted_by_id() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let registry = SessionRegistry::new();
    for id in ["db", "web", "cache"] {
        let s = session(id, &remote)?;
        s.connect().await?;
        registry.put(s).await;
    }

    let infos = registry.list();
    let ids: Vec<&str> = infos.iter().map(|i| i.conn_id.as_str()).collect();
    assert_eq!(ids, vec!["cache", "db", "web"]);
    assert!(infos.iter().all(|i| i.transport == TransportState::Connected));
    assert_eq!(infos[0].host, "cache.internal");
    Ok(())
}

#[tokio::test]
async fn shutdown_disconnects_everything() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let registry = SessionRegistry::new();
    let mut kept = Vec::new();
    for id in ["a", "b"] {
        let s = session(id, &remote)?;
        s.connect().await?;
        let (tx, _rx) = mpsc::channel(8);
        s.open_shell(tx).await?;
        kept.push(Arc::clone(&s));
        registry.put(s).await;
    }

    registry.shutdown().await;
    assert!(registry.is_empty());
    assert_eq!(remote.closes(), 2);
    for s in kept {
        assert!(!s.reader_running().await);
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_puts_keep_one_session() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let registry = Arc::new(SessionRegistry::new());
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let s = session("web", &remote)?;
        s.connect().await?;
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move { registry.put(s).await }));
    }
    for task in tasks {
        task.await?;
    }
    assert_eq!(registry.len(), 1);
    assert_eq!(remote.connects(), 4);
    assert_eq!(remote.closes(), 3);
    Ok(())
}
