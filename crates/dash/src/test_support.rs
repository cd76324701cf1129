// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: an in-memory remote shell, state builder,
//! and assertion helpers.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::remote::{
    BoxFuture, ConnectTarget, ExecOutput, RemoteClient, RemoteConnection, RemoteError,
    ShellChannel, ShellReader, ShellWriter,
};
use crate::transport::state::AppState;

enum ShellInput {
    Data(Bytes),
    Fail(String),
    End,
}

#[derive(Default)]
struct MockShared {
    connects: AtomicU32,
    closes: AtomicU32,
    shells_opened: AtomicU32,
    fail_connects: AtomicU32,
    fail_open_shell: AtomicBool,
    shell: Mutex<Option<mpsc::UnboundedSender<ShellInput>>>,
    written: Mutex<Vec<String>>,
    fail_exec: AtomicBool,
    exec_replies: Mutex<Vec<(String, String)>>,
    executed: Mutex<Vec<String>>,
}

/// In-memory [`RemoteClient`]. Clones share counters and the current shell.
///
/// The shell answers `echo X` with `X\r\n` and ignores other input.
/// `exec` answers with the first reply registered via
/// [`reply_to`](Self::reply_to) whose fragment the command contains, or
/// with empty output.
#[derive(Clone, Default)]
pub struct MockRemote {
    shared: Arc<MockShared>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` handshakes.
    pub fn fail_next_connects(&self, n: u32) {
        self.shared.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn fail_open_shell(&self, fail: bool) {
        self.shared.fail_open_shell.store(fail, Ordering::SeqCst);
    }

    /// Successful handshakes so far.
    pub fn connects(&self) -> u32 {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Connection close calls so far.
    pub fn closes(&self) -> u32 {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn shells_opened(&self) -> u32 {
        self.shared.shells_opened.load(Ordering::SeqCst)
    }

    /// Everything written to any shell, one entry per write.
    pub fn written(&self) -> Vec<String> {
        self.shared.written.lock().clone()
    }

    /// Emit output on the most recently opened shell.
    pub fn push_output(&self, data: impl Into<Bytes>) -> bool {
        self.feed(ShellInput::Data(data.into()))
    }

    /// Make the next read on the current shell fail.
    pub fn fail_read(&self, message: impl Into<String>) -> bool {
        self.feed(ShellInput::Fail(message.into()))
    }

    /// Close the current shell from the remote side.
    pub fn end_shell(&self) -> bool {
        self.feed(ShellInput::End)
    }

    /// Answer any `exec` whose command contains `fragment` with `stdout`.
    pub fn reply_to(&self, fragment: impl Into<String>, stdout: impl Into<String>) {
        self.shared.exec_replies.lock().push((fragment.into(), stdout.into()));
    }

    pub fn fail_exec(&self, fail: bool) {
        self.shared.fail_exec.store(fail, Ordering::SeqCst);
    }

    /// Every command passed to `exec`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.shared.executed.lock().clone()
    }

    fn feed(&self, input: ShellInput) -> bool {
        self.shared.shell.lock().as_ref().is_some_and(|tx| tx.send(input).is_ok())
    }
}

impl RemoteClient for MockRemote {
    fn connect<'a>(
        &'a self,
        _target: &'a ConnectTarget,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteConnection>, RemoteError>> {
        Box::pin(async move {
            let failing = self
                .shared
                .fail_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(RemoteError::Connect("authentication failed".to_owned()));
            }
            self.shared.connects.fetch_add(1, Ordering::SeqCst);
            let connection: Box<dyn RemoteConnection> =
                Box::new(MockConnection { shared: Arc::clone(&self.shared) });
            Ok(connection)
        })
    }
}

struct MockConnection {
    shared: Arc<MockShared>,
}

impl RemoteConnection for MockConnection {
    fn open_shell(&self) -> BoxFuture<'_, Result<ShellChannel, RemoteError>> {
        Box::pin(async move {
            if self.shared.fail_open_shell.load(Ordering::SeqCst) {
                return Err(RemoteError::Channel("shell request refused".to_owned()));
            }
            self.shared.shells_opened.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            *self.shared.shell.lock() = Some(tx.clone());
            Ok(ShellChannel {
                reader: Box::new(MockReader { rx }),
                writer: Box::new(MockWriter { tx, shared: Arc::clone(&self.shared) }),
            })
        })
    }

    fn exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ExecOutput, RemoteError>> {
        Box::pin(async move {
            self.shared.executed.lock().push(command.to_owned());
            if self.shared.fail_exec.load(Ordering::SeqCst) {
                return Err(RemoteError::Channel("exec request refused".to_owned()));
            }
            let stdout = self
                .shared
                .exec_replies
                .lock()
                .iter()
                .find(|(fragment, _)| command.contains(fragment.as_str()))
                .map(|(_, stdout)| stdout.clone())
                .unwrap_or_default();
            Ok(ExecOutput { stdout, exit_status: Some(0) })
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
            if let Some(tx) = self.shared.shell.lock().take() {
                let _ = tx.send(ShellInput::End);
            }
        })
    }
}

struct MockReader {
    rx: mpsc::UnboundedReceiver<ShellInput>,
}

impl ShellReader for MockReader {
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, RemoteError>> {
        Box::pin(async move {
            match self.rx.recv().await {
                Some(ShellInput::Data(data)) => Ok(Some(data)),
                Some(ShellInput::Fail(message)) => Err(RemoteError::Channel(message)),
                Some(ShellInput::End) | None => Ok(None),
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.rx.close();
        })
    }
}

struct MockWriter {
    tx: mpsc::UnboundedSender<ShellInput>,
    shared: Arc<MockShared>,
}

impl ShellWriter for MockWriter {
    fn send<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            let text = String::from_utf8_lossy(data).into_owned();
            self.shared.written.lock().push(text.clone());
            for line in text.lines() {
                if let Some(rest) = line.strip_prefix("echo ") {
                    self.tx
                        .send(ShellInput::Data(Bytes::from(format!("{rest}\r\n"))))
                        .map_err(|_| RemoteError::Channel("shell closed".to_owned()))?;
                }
            }
            Ok(())
        })
    }
}

/// Builder for `AppState` rooted at a scratch directory, backed by a
/// [`MockRemote`].
pub struct StateBuilder {
    config: Config,
    remote: MockRemote,
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StateBuilder {
    pub fn new() -> Self {
        Self { config: Config::test(), remote: MockRemote::new() }
    }

    pub fn auth_token(mut self, t: impl Into<String>) -> Self {
        self.config.auth_token = Some(t.into());
        self
    }

    pub fn interpreter(mut self, program: impl Into<String>) -> Self {
        self.config.interpreter = program.into();
        self
    }

    pub fn process_match(mut self, pattern: impl Into<String>) -> Self {
        self.config.process_match = pattern.into();
        self
    }

    pub fn remote(mut self, remote: MockRemote) -> Self {
        self.remote = remote;
        self
    }

    pub fn build(mut self, base_dir: &Path) -> anyhow::Result<Arc<AppState>> {
        self.config.base_dir = Some(base_dir.to_path_buf());
        let state = AppState::new(self.config, Arc::new(self.remote))?;
        Ok(Arc::new(state))
    }
}

/// Extension trait to convert any `Display` error into `anyhow::Error`.
/// Replaces `.map_err(|e| anyhow::anyhow!("{e}"))` with `.anyhow()`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Spawn an HTTP server on a random port for integration testing.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_http_server(
    state: Arc<AppState>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let router = crate::transport::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}
