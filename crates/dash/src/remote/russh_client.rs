// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`RemoteClient`] backed by `russh`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use russh::client::{self, Handle, Msg};
use russh::keys::ssh_key::{self, HashAlg};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{
    BoxFuture, ConnectTarget, Credential, ExecOutput, RemoteClient, RemoteConnection,
    RemoteError, ShellChannel, ShellReader, ShellWriter,
};
use crate::config::HostKeyPolicy;

const PTY_TERM: &str = "xterm";
const PTY_COLS: u32 = 80;
const PTY_ROWS: u32 = 24;

pub struct RusshClient {
    policy: HostKeyPolicy,
    connect_timeout: Duration,
    config: Arc<client::Config>,
}

impl RusshClient {
    pub fn new(policy: HostKeyPolicy, connect_timeout: Duration) -> Self {
        let config = client::Config { inactivity_timeout: None, ..Default::default() };
        Self { policy, connect_timeout, config: Arc::new(config) }
    }

    async fn handshake(&self, target: &ConnectTarget) -> Result<RusshConnection, RemoteError> {
        let handler =
            HostKeyCheck { host: target.host.clone(), port: target.port, policy: self.policy };
        let connecting =
            client::connect(Arc::clone(&self.config), (target.host.as_str(), target.port), handler);
        let mut handle = match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(RemoteError::Connect(e.to_string())),
            Err(_) => {
                return Err(RemoteError::Connect(format!(
                    "timed out after {}ms",
                    self.connect_timeout.as_millis()
                )))
            }
        };

        let authenticated = match &target.credential {
            Credential::Password(password) => handle
                .authenticate_password(&target.username, password)
                .await
                .map_err(connect_err)?
                .success(),
            Credential::KeyFile { path, passphrase } => {
                let key = russh::keys::load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| RemoteError::Connect(format!("{}: {e}", path.display())))?;
                let hash_alg = handle.best_supported_rsa_hash().await.map_err(connect_err)?.flatten();
                handle
                    .authenticate_publickey(
                        &target.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(connect_err)?
                    .success()
            }
        };
        if !authenticated {
            let _ = handle.disconnect(Disconnect::ByApplication, "", "en").await;
            return Err(RemoteError::Connect("authentication failed".to_owned()));
        }

        Ok(RusshConnection { handle: tokio::sync::Mutex::new(Some(handle)) })
    }
}

impl RemoteClient for RusshClient {
    fn connect<'a>(
        &'a self,
        target: &'a ConnectTarget,
    ) -> BoxFuture<'a, Result<Box<dyn RemoteConnection>, RemoteError>> {
        Box::pin(async move {
            let connection = self.handshake(target).await?;
            Ok(Box::new(connection) as Box<dyn RemoteConnection>)
        })
    }
}

fn connect_err(e: russh::Error) -> RemoteError {
    RemoteError::Connect(e.to_string())
}

fn channel_err(e: russh::Error) -> RemoteError {
    RemoteError::Channel(e.to_string())
}

struct HostKeyCheck {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);
        match self.policy {
            HostKeyPolicy::AcceptAny => {
                warn!(
                    host = %self.host,
                    port = self.port,
                    %fingerprint,
                    "accepting unverified host key"
                );
                Ok(true)
            }
            HostKeyPolicy::KnownHosts => {
                match russh::keys::check_known_hosts(&self.host, self.port, server_public_key) {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        warn!(host = %self.host, %fingerprint, "host key not in known_hosts");
                        Ok(false)
                    }
                    Err(e) => {
                        warn!(host = %self.host, %fingerprint, err = %e, "host key rejected");
                        Ok(false)
                    }
                }
            }
        }
    }
}

struct RusshConnection {
    handle: tokio::sync::Mutex<Option<Handle<HostKeyCheck>>>,
}

impl RemoteConnection for RusshConnection {
    fn open_shell(&self) -> BoxFuture<'_, Result<ShellChannel, RemoteError>> {
        Box::pin(async move {
            let guard = self.handle.lock().await;
            let Some(handle) = guard.as_ref() else {
                return Err(RemoteError::NotConnected);
            };
            let channel = handle.channel_open_session().await.map_err(channel_err)?;
            drop(guard);

            channel
                .request_pty(false, PTY_TERM, PTY_COLS, PTY_ROWS, 0, 0, &[])
                .await
                .map_err(channel_err)?;
            channel.request_shell(true).await.map_err(channel_err)?;
            debug!(channel = ?channel.id(), "interactive shell requested");

            let writer = RusshWriter { inner: Box::pin(channel.make_writer()) };
            let reader = RusshReader { channel: Some(channel) };
            Ok(ShellChannel { reader: Box::new(reader), writer: Box::new(writer) })
        })
    }

    fn exec<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ExecOutput, RemoteError>> {
        Box::pin(async move {
            let guard = self.handle.lock().await;
            let Some(handle) = guard.as_ref() else {
                return Err(RemoteError::NotConnected);
            };
            let mut channel = handle.channel_open_session().await.map_err(channel_err)?;
            drop(guard);

            channel.exec(true, command).await.map_err(channel_err)?;
            let mut stdout = Vec::new();
            let mut exit_status = None;
            // Exit status may arrive after EOF, so drain until the channel closes.
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                    ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
            debug!(command, ?exit_status, bytes = stdout.len(), "remote command finished");
            Ok(ExecOutput { stdout: String::from_utf8_lossy(&stdout).into_owned(), exit_status })
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some(handle) = self.handle.lock().await.take() else {
                return;
            };
            match handle.disconnect(Disconnect::ByApplication, "", "en").await {
                Ok(()) => info!("ssh connection closed"),
                Err(e) => debug!(err = %e, "ssh disconnect"),
            }
        })
    }
}

struct RusshReader {
    channel: Option<Channel<Msg>>,
}

impl ShellReader for RusshReader {
    fn recv(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, RemoteError>> {
        Box::pin(async move {
            let Some(channel) = self.channel.as_mut() else {
                return Ok(None);
            };
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => return Ok(Some(Bytes::copy_from_slice(&data))),
                    Some(ChannelMsg::ExtendedData { data, .. }) => {
                        return Ok(Some(Bytes::copy_from_slice(&data)))
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return Ok(None),
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        debug!(exit_status, "remote shell exited");
                    }
                    Some(_) => {}
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(channel) = self.channel.take() {
                let _ = channel.eof().await;
                let _ = channel.close().await;
            }
        })
    }
}

struct RusshWriter {
    inner: Pin<Box<dyn AsyncWrite + Send>>,
}

impl ShellWriter for RusshWriter {
    fn send<'a>(&'a mut self, data: &'a [u8]) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            self.inner.write_all(data).await.map_err(|e| RemoteError::Channel(e.to_string()))?;
            self.inner.flush().await.map_err(|e| RemoteError::Channel(e.to_string()))
        })
    }
}
