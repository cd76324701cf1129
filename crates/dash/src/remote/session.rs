// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ConnectTarget, ExecOutput, RemoteClient, RemoteConnection, RemoteError, ShellReader,
    ShellWriter,
};
use crate::ansi::{AnsiFilter, ShellDecoder};

/// Connection state of the underlying network handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransportState {
    Disconnected {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Connecting,
    Connected,
}

/// State of the (at most one) interactive shell on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellState {
    NotOpen,
    Open,
    Closed,
}

/// Event forwarded from a shell reader to its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Output(String),
    Error(String),
}

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Idle tick on which the reader checks whether its sink is still alive.
    pub poll_interval: Duration,
    /// Upper bound on waiting for the reader task to finish.
    pub disconnect_wait: Duration,
    /// Upper bound on one non-interactive command.
    pub exec_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            disconnect_wait: Duration::from_secs(1),
            exec_timeout: Duration::from_secs(10),
        }
    }
}

/// Serializable view of a session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub conn_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub transport: TransportState,
    pub shell: ShellState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Status {
    transport: TransportState,
    shell: ShellState,
    /// Bumped on every shell open so a stale reader cannot close a newer shell.
    generation: u64,
    last_error: Option<String>,
}

struct ReaderHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    connection: Option<Arc<dyn RemoteConnection>>,
    reader: Option<ReaderHandle>,
}

/// One authenticated connection to a remote host and at most one shell on it.
///
/// The session exclusively owns the network handle and, while a shell is
/// open, its writer and the reader task handle. Lifecycle operations are
/// serialized on an async lock; the status itself sits behind a short
/// synchronous lock so listings never wait on I/O.
pub struct RemoteSession {
    id: String,
    target: ConnectTarget,
    client: Arc<dyn RemoteClient>,
    filter: Arc<AnsiFilter>,
    settings: SessionSettings,
    status: Arc<Mutex<Status>>,
    inner: tokio::sync::Mutex<Inner>,
    writer: tokio::sync::Mutex<Option<Box<dyn ShellWriter>>>,
}

impl RemoteSession {
    pub fn new(
        id: impl Into<String>,
        target: ConnectTarget,
        client: Arc<dyn RemoteClient>,
        filter: Arc<AnsiFilter>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            id: id.into(),
            target,
            client,
            filter,
            settings,
            status: Arc::new(Mutex::new(Status {
                transport: TransportState::Disconnected { error: None },
                shell: ShellState::NotOpen,
                generation: 0,
                last_error: None,
            })),
            inner: tokio::sync::Mutex::new(Inner { connection: None, reader: None }),
            writer: tokio::sync::Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &ConnectTarget {
        &self.target
    }

    pub fn transport_state(&self) -> TransportState {
        self.status.lock().transport.clone()
    }

    pub fn shell_state(&self) -> ShellState {
        self.status.lock().shell
    }

    pub fn info(&self) -> SessionInfo {
        let status = self.status.lock();
        SessionInfo {
            conn_id: self.id.clone(),
            host: self.target.host.clone(),
            port: self.target.port,
            username: self.target.username.clone(),
            transport: status.transport.clone(),
            shell: status.shell,
            last_error: status.last_error.clone(),
        }
    }

    /// Whether a reader task is still running for this session.
    pub async fn reader_running(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.reader.as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Perform the handshake. A failure leaves the session reusable.
    pub async fn connect(&self) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().await;
        if inner.connection.is_some() && self.transport_state() == TransportState::Connected {
            return Ok(());
        }
        self.status.lock().transport = TransportState::Connecting;

        match self.client.connect(&self.target).await {
            Ok(connection) => {
                inner.connection = Some(Arc::from(connection));
                let mut status = self.status.lock();
                status.transport = TransportState::Connected;
                status.last_error = None;
                drop(status);
                info!(
                    conn_id = %self.id,
                    host = %self.target.host,
                    port = self.target.port,
                    "remote session connected"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                let mut status = self.status.lock();
                status.transport = TransportState::Disconnected { error: Some(message.clone()) };
                status.last_error = Some(message);
                drop(status);
                warn!(conn_id = %self.id, host = %self.target.host, err = %e, "remote connect failed");
                Err(e)
            }
        }
    }

    /// Open an interactive shell and start its reader, forwarding to `sink`.
    ///
    /// Requires a connected transport and no shell already open. Any
    /// failure leaves the shell state as it was. Returns the shell's
    /// generation for [`close_shell_if_current`](Self::close_shell_if_current).
    pub async fn open_shell(&self, sink: mpsc::Sender<ShellEvent>) -> Result<u64, RemoteError> {
        let mut inner = self.inner.lock().await;
        {
            let status = self.status.lock();
            if status.transport != TransportState::Connected {
                return Err(RemoteError::NotConnected);
            }
            if status.shell == ShellState::Open {
                return Err(RemoteError::ShellAlreadyOpen);
            }
        }
        if inner.connection.is_none() {
            return Err(RemoteError::NotConnected);
        }

        // A previous reader that exited on its own still has a handle to reap.
        self.stop_reader(&mut inner).await;

        let Some(connection) = inner.connection.as_ref() else {
            return Err(RemoteError::NotConnected);
        };
        let channel = connection.open_shell().await?;
        *self.writer.lock().await = Some(channel.writer);

        let generation = {
            let mut status = self.status.lock();
            status.shell = ShellState::Open;
            status.generation += 1;
            status.generation
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            ReadLoop {
                conn_id: self.id.clone(),
                reader: channel.reader,
                sink,
                filter: Arc::clone(&self.filter),
                poll_interval: self.settings.poll_interval,
                cancel: cancel.clone(),
                status: Arc::clone(&self.status),
                generation,
            }
            .run(),
        );
        inner.reader = Some(ReaderHandle { cancel, task });
        debug!(conn_id = %self.id, generation, "shell opened");
        Ok(generation)
    }

    /// Write one command to the open shell, appending a newline if absent.
    pub async fn send_command(&self, text: &str) -> Result<(), RemoteError> {
        if self.shell_state() != ShellState::Open {
            return Err(RemoteError::ShellNotOpen);
        }
        let mut command = text.to_owned();
        if !command.ends_with('\n') {
            command.push('\n');
        }
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(RemoteError::ShellNotOpen);
        };
        writer.send(command.as_bytes()).await
    }

    /// Run a non-interactive command on its own channel, bounded by the
    /// session's exec timeout. Independent of the interactive shell.
    pub async fn exec(&self, command: &str) -> Result<ExecOutput, RemoteError> {
        let connection = {
            let inner = self.inner.lock().await;
            if self.transport_state() != TransportState::Connected {
                return Err(RemoteError::NotConnected);
            }
            inner.connection.clone().ok_or(RemoteError::NotConnected)?
        };
        match tokio::time::timeout(self.settings.exec_timeout, connection.exec(command)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(conn_id = %self.id, command, "remote command timed out");
                Err(RemoteError::Channel(format!(
                    "command timed out after {}ms",
                    self.settings.exec_timeout.as_millis()
                )))
            }
        }
    }

    /// Stop the reader and drop the shell, keeping the connection.
    pub async fn close_shell(&self) {
        let mut inner = self.inner.lock().await;
        self.close_shell_locked(&mut inner).await;
    }

    /// Like [`close_shell`](Self::close_shell), but only if the open shell is
    /// still the one identified by `generation`.
    pub async fn close_shell_if_current(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if self.status.lock().generation != generation {
            return;
        }
        self.close_shell_locked(&mut inner).await;
    }

    async fn close_shell_locked(&self, inner: &mut Inner) {
        self.stop_reader(inner).await;
        self.release_writer().await;
        let mut status = self.status.lock();
        if status.shell == ShellState::Open {
            status.shell = ShellState::Closed;
        }
    }

    /// Stop the reader, close the shell and the network handle.
    ///
    /// Idempotent: a session with nothing left to release returns at once.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.reader.is_none() && inner.connection.is_none() {
            return;
        }
        self.stop_reader(&mut inner).await;
        self.release_writer().await;
        if let Some(connection) = inner.connection.take() {
            connection.close().await;
        }
        {
            let mut status = self.status.lock();
            status.transport = TransportState::Disconnected { error: None };
            if status.shell == ShellState::Open {
                status.shell = ShellState::Closed;
            }
        }
        info!(conn_id = %self.id, "remote session disconnected");
    }

    /// Cancel and join the reader, aborting it if the bounded wait elapses.
    async fn stop_reader(&self, inner: &mut Inner) {
        let Some(ReaderHandle { cancel, mut task }) = inner.reader.take() else {
            return;
        };
        cancel.cancel();
        if tokio::time::timeout(self.settings.disconnect_wait, &mut task).await.is_err() {
            warn!(conn_id = %self.id, "shell reader did not stop in time, aborting");
            task.abort();
        }
    }

    async fn release_writer(&self) {
        match tokio::time::timeout(self.settings.disconnect_wait, self.writer.lock()).await {
            Ok(mut writer) => {
                writer.take();
            }
            Err(_) => warn!(conn_id = %self.id, "shell writer busy, leaving it to drop"),
        }
    }
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.lock();
        f.debug_struct("RemoteSession")
            .field("id", &self.id)
            .field("host", &self.target.host)
            .field("transport", &status.transport)
            .field("shell", &status.shell)
            .field("generation", &status.generation)
            .finish()
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if let Some(reader) = self.inner.get_mut().reader.take() {
            reader.cancel.cancel();
        }
    }
}

#[derive(Debug)]
enum ReaderExit {
    Cancelled,
    SinkClosed,
    ChannelClosed,
    ReadError,
}

struct ReadLoop {
    conn_id: String,
    reader: Box<dyn ShellReader>,
    sink: mpsc::Sender<ShellEvent>,
    filter: Arc<AnsiFilter>,
    poll_interval: Duration,
    cancel: CancellationToken,
    status: Arc<Mutex<Status>>,
    generation: u64,
}

impl ReadLoop {
    async fn run(mut self) {
        let mut decoder = ShellDecoder::new();
        let mut idle = tokio::time::interval(self.poll_interval);
        idle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break ReaderExit::Cancelled,
                chunk = self.reader.recv() => match chunk {
                    Ok(Some(bytes)) => {
                        let text = self.filter.strip(&decoder.decode(&bytes));
                        if !text.is_empty()
                            && !forward(&self.cancel, &self.sink, ShellEvent::Output(text)).await
                        {
                            break ReaderExit::SinkClosed;
                        }
                    }
                    Ok(None) => {
                        let rest = self.filter.strip(&decoder.finish());
                        if !rest.is_empty() {
                            let _ = forward(&self.cancel, &self.sink, ShellEvent::Output(rest)).await;
                        }
                        break ReaderExit::ChannelClosed;
                    }
                    Err(e) => {
                        let message = format!("Error reading output: {e}");
                        let _ = self.sink.try_send(ShellEvent::Error(message.clone()));
                        self.status.lock().last_error = Some(message);
                        break ReaderExit::ReadError;
                    }
                },
                _ = idle.tick() => {
                    if self.sink.is_closed() {
                        break ReaderExit::SinkClosed;
                    }
                }
            }
        };

        self.reader.close().await;
        {
            let mut status = self.status.lock();
            if status.generation == self.generation && status.shell == ShellState::Open {
                status.shell = ShellState::Closed;
            }
        }
        debug!(conn_id = %self.conn_id, ?exit, "shell reader exited");
    }
}

/// Send to the sink unless cancelled first. Returns false once the sink is gone.
///
/// Borrows only the `Sync` parts of the loop so the reader future stays `Send`.
async fn forward(
    cancel: &CancellationToken,
    sink: &mpsc::Sender<ShellEvent>,
    event: ShellEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        sent = sink.send(event) => sent.is_ok(),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
