// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{RemoteSession, SessionSettings, ShellEvent, ShellState, TransportState};
use crate::ansi::AnsiFilter;
use crate::remote::{ConnectTarget, Credential, RemoteError};
use crate::test_support::MockRemote;

fn session(remote: &MockRemote) -> anyhow::Result<Arc<RemoteSession>> {
    let target = ConnectTarget {
        host: "10.0.0.5".to_owned(),
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
        "web",
        target,
        Arc::new(remote.clone()),
        Arc::new(AnsiFilter::new()?),
        settings,
    )))
}

async fn recv(rx: &mut mpsc::Receiver<ShellEvent>) -> anyhow::Result<ShellEvent> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("sink closed"))
}

async fn wait_for_shell(session: &RemoteSession, state: ShellState) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while session.shell_state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn open_shell_requires_connection() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    let (tx, _rx) = mpsc::channel(8);

    assert_eq!(session.open_shell(tx).await, Err(RemoteError::NotConnected));
    assert_eq!(session.shell_state(), ShellState::NotOpen);
    assert_eq!(remote.shells_opened(), 0);
    Ok(())
}

#[tokio::test]
async fn connect_failure_then_retry() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    remote.fail_next_connects(1);
    let session = session(&remote)?;

    crate::assert_err_contains!(session.connect().await, "authentication failed");
    assert!(matches!(
        session.transport_state(),
        TransportState::Disconnected { error: Some(_) }
    ));
    assert!(session.info().last_error.is_some());

    session.connect().await?;
    assert_eq!(session.transport_state(), TransportState::Connected);
    assert!(session.info().last_error.is_none());
    assert_eq!(remote.connects(), 1);

    // Already connected: no second handshake.
    session.connect().await?;
    assert_eq!(remote.connects(), 1);
    Ok(())
}

#[tokio::test]
async fn second_open_conflicts() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;

    let (tx, _rx) = mpsc::channel(8);
    let (tx2, _rx2) = mpsc::channel(8);
    session.open_shell(tx).await?;
    assert_eq!(session.open_shell(tx2).await, Err(RemoteError::ShellAlreadyOpen));
    assert_eq!(session.shell_state(), ShellState::Open);
    assert_eq!(remote.shells_opened(), 1);
    Ok(())
}

#[tokio::test]
async fn open_failure_leaves_state() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    remote.fail_open_shell(true);
    let session = session(&remote)?;
    session.connect().await?;

    let (tx, _rx) = mpsc::channel(8);
    crate::assert_err_contains!(session.open_shell(tx).await, "shell request refused");
    assert_eq!(session.shell_state(), ShellState::NotOpen);
    assert!(!session.reader_running().await);
    Ok(())
}

#[tokio::test]
async fn send_command_appends_newline() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;
    assert_eq!(session.send_command("ls").await, Err(RemoteError::ShellNotOpen));

    let (tx, mut rx) = mpsc::channel(8);
    session.open_shell(tx).await?;
    session.send_command("echo hi").await?;
    session.send_command("pwd\n").await?;

    assert_eq!(remote.written(), vec!["echo hi\n", "pwd\n"]);
    assert_eq!(recv(&mut rx).await?, ShellEvent::Output("hi\r\n".to_owned()));
    Ok(())
}

#[tokio::test]
async fn output_is_stripped_of_escapes() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;
    let (tx, mut rx) = mpsc::channel(8);
    session.open_shell(tx).await?;

    assert!(remote.push_output(&b"\x1b[01;32mops@web\x1b"[..]));
    assert!(remote.push_output(&b"[0m:~$ "[..]));
    let mut text = String::new();
    while text != "ops@web:~$ " {
        match recv(&mut rx).await? {
            ShellEvent::Output(chunk) => text.push_str(&chunk),
            ShellEvent::Error(e) => anyhow::bail!("unexpected error event: {e}"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_disconnects_close_once() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;
    let (tx, _rx) = mpsc::channel(8);
    session.open_shell(tx).await?;

    tokio::join!(session.disconnect(), session.disconnect());

    assert_eq!(remote.closes(), 1);
    assert_eq!(session.transport_state(), TransportState::Disconnected { error: None });
    assert_eq!(session.shell_state(), ShellState::Closed);
    assert!(!session.reader_running().await);

    session.disconnect().await;
    assert_eq!(remote.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn read_error_reported_and_shell_closed() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;
    let (tx, mut rx) = mpsc::channel(8);
    session.open_shell(tx).await?;

    assert!(remote.fail_read("connection reset"));
    let event = recv(&mut rx).await?;
    assert!(
        matches!(&event, ShellEvent::Error(m) if m.starts_with("Error reading output:") && m.contains("connection reset")),
        "{event:?}"
    );
    wait_for_shell(&session, ShellState::Closed).await?;
    assert!(session.info().last_error.is_some());
    assert_eq!(session.transport_state(), TransportState::Connected);
    Ok(())
}

#[tokio::test]
async fn remote_end_allows_reopen() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;

    let (tx, _rx) = mpsc::channel(8);
    let first = session.open_shell(tx).await?;
    assert!(remote.end_shell());
    wait_for_shell(&session, ShellState::Closed).await?;

    let (tx, _rx) = mpsc::channel(8);
    let second = session.open_shell(tx).await?;
    assert!(second > first);
    assert_eq!(session.shell_state(), ShellState::Open);
    assert_eq!(remote.shells_opened(), 2);
    Ok(())
}

#[tokio::test]
async fn stale_close_keeps_newer_shell() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;

    let (tx, _rx) = mpsc::channel(8);
    let first = session.open_shell(tx).await?;
    session.close_shell().await;
    assert_eq!(session.shell_state(), ShellState::Closed);

    let (tx, _rx2) = mpsc::channel(8);
    session.open_shell(tx).await?;
    session.close_shell_if_current(first).await;
    assert_eq!(session.shell_state(), ShellState::Open);
    assert!(session.reader_running().await);
    Ok(())
}

#[tokio::test]
async fn dropped_sink_stops_reader() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;

    let (tx, rx) = mpsc::channel(8);
    session.open_shell(tx).await?;
    drop(rx);
    wait_for_shell(&session, ShellState::Closed).await?;
    tokio::time::timeout(Duration::from_secs(2), async {
        while session.reader_running().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn exec_runs_beside_the_shell() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    remote.reply_to("uptime", " 10:00:00 up 3 days\n");
    let session = session(&remote)?;
    assert_eq!(session.exec("uptime").await, Err(RemoteError::NotConnected));

    session.connect().await?;
    let (tx, _rx) = mpsc::channel(8);
    session.open_shell(tx).await?;
    let out = session.exec("uptime").await?;
    assert_eq!(out.stdout, " 10:00:00 up 3 days\n");
    assert_eq!(out.exit_status, Some(0));
    assert_eq!(session.shell_state(), ShellState::Open);
    assert!(remote.written().is_empty());

    session.disconnect().await;
    assert_eq!(session.exec("uptime").await, Err(RemoteError::NotConnected));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reader_runs_on_worker_threads() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;
    let (tx, mut rx) = mpsc::channel(8);
    session.open_shell(tx).await?;

    for word in ["one", "two", "three"] {
        assert!(remote.push_output(format!("{word}\r\n")));
        assert_eq!(recv(&mut rx).await?, ShellEvent::Output(format!("{word}\r\n")));
    }
    session.disconnect().await;
    assert_eq!(session.shell_state(), ShellState::Closed);
    Ok(())
}

#[tokio::test]
async fn debug_shows_id_and_states() -> anyhow::Result<()> {
    let remote = MockRemote::new();
    let session = session(&remote)?;
    session.connect().await?;

    let rendered = format!("{session:?}");
    assert!(rendered.contains("\"web\""), "{rendered}");
    assert!(rendered.contains("Connected"), "{rendered}");
    assert!(rendered.contains("NotOpen"), "{rendered}");
    Ok(())
}
