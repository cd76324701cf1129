// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote shell sessions: the client seam, per-connection session state, the
//! registry of live sessions, and the WebSocket shell bridge.

pub mod bridge;
pub mod host_info;
pub mod registry;
pub mod russh_client;
pub mod session;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::ErrorCode;

pub use registry::SessionRegistry;
pub use session::{RemoteSession, SessionInfo, SessionSettings, ShellEvent, ShellState, TransportState};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Credential presented during the handshake.
#[derive(Clone)]
pub enum Credential {
    Password(String),
    KeyFile { path: PathBuf, passphrase: Option<String> },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(..)"),
            Self::KeyFile { path, .. } => {
                f.debug_struct("KeyFile").field("path", path).finish_non_exhaustive()
            }
        }
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

/// Remote shell client abstraction.
///
/// Object-safe for use as `Arc<dyn RemoteClient>`.
pub trait RemoteClient: Send + Sync + 'static {
    /// Perform the protocol handshake and authenticate.
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteConnection>, RemoteError>>;
}

/// An authenticated connection that can host interactive shells.
pub trait RemoteConnection: Send + Sync {
    fn open_shell(&self) -> BoxFuture<'_, Result<ShellChannel, RemoteError>>;

    /// Run one command on its own channel and collect its standard output.
    fn exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ExecOutput, RemoteError>>;

    /// Close the underlying network handle. Must tolerate repeated calls.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Read half of an interactive shell channel.
pub trait ShellReader: Send {
    /// Next chunk of output, or `None` once the channel has closed.
    ///
    /// Must be cancel-safe: dropping the future loses no data.
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, RemoteError>>;

    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Write half of an interactive shell channel.
pub trait ShellWriter: Send {
    fn send<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, Result<(), RemoteError>>;
}

/// Result of [`RemoteConnection::exec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    /// `None` when the remote closed without reporting one.
    pub exit_status: Option<u32>,
}

/// An open interactive shell, split into its two halves.
pub struct ShellChannel {
    pub reader: Box<dyn ShellReader>,
    pub writer: Box<dyn ShellWriter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    NotConnected,
    ShellAlreadyOpen,
    ShellNotOpen,
    SessionNotFound(String),
    /// Handshake or authentication failure.
    Connect(String),
    /// Shell channel open, read or write failure.
    Channel(String),
}

impl RemoteError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotConnected => ErrorCode::NotConnected,
            Self::ShellAlreadyOpen => ErrorCode::Conflict,
            Self::ShellNotOpen => ErrorCode::Conflict,
            Self::SessionNotFound(_) => ErrorCode::NotFound,
            Self::Connect(_) => ErrorCode::ConnectFailed,
            Self::Channel(_) => ErrorCode::ChannelFailed,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => f.write_str("not connected"),
            Self::ShellAlreadyOpen => f.write_str("shell already open"),
            Self::ShellNotOpen => f.write_str("shell not opened"),
            Self::SessionNotFound(id) => write!(f, "SSH session not found: {id}"),
            Self::Connect(msg) => write!(f, "connect failed: {msg}"),
            Self::Channel(msg) => write!(f, "channel error: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

