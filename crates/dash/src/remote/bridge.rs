// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relays one WebSocket connection to a registered session's shell.
//!
//! Outbound frames are externally tagged JSON (`{"output": ".."}` or
//! `{"error": ".."}`). Inbound text is a `{"command": ".."}` envelope, or
//! raw shell input when it does not parse as one.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{SessionRegistry, ShellEvent};

/// Sink capacity between a shell reader and its bridge.
const EVENT_CAPACITY: usize = 256;

pub const CONNECTED_NOTICE: &str = "SSH connection established\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellFrame {
    Output(String),
    Error(String),
}

impl From<ShellEvent> for ShellFrame {
    fn from(event: ShellEvent) -> Self {
        match event {
            ShellEvent::Output(text) => Self::Output(text),
            ShellEvent::Error(text) => Self::Error(text),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommandEnvelope {
    command: Option<String>,
}

/// Shell input carried by one inbound text message, if any.
///
/// JSON objects contribute their `command` field (and nothing without
/// one); anything that is not a JSON object is literal input.
pub fn parse_inbound(text: &str) -> Option<String> {
    match serde_json::from_str::<CommandEnvelope>(text) {
        Ok(envelope) => envelope.command,
        Err(_) => Some(text.to_owned()),
    }
}

/// Bridge `socket` to the shell of session `conn_id` until either side closes.
///
/// The session stays registered and connected afterwards so another bridge
/// can re-attach; only the shell opened here is closed.
pub async fn run(registry: &SessionRegistry, conn_id: &str, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let session = match registry.get(conn_id) {
        Ok(session) => session,
        Err(_) => {
            debug!(conn_id, "shell bridge for unknown session");
            let _ = send_frame(&mut ws_tx, &ShellFrame::Error("SSH session not found".to_owned()))
                .await;
            let _ = ws_tx.close().await;
            return;
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CAPACITY);
    let generation = match session.open_shell(event_tx).await {
        Ok(generation) => generation,
        Err(e) => {
            warn!(conn_id, err = %e, "failed to open shell");
            let frame = ShellFrame::Error(format!("Failed to open shell: {e}"));
            let _ = send_frame(&mut ws_tx, &frame).await;
            let _ = ws_tx.close().await;
            return;
        }
    };

    if send_frame(&mut ws_tx, &ShellFrame::Output(CONNECTED_NOTICE.to_owned())).await.is_ok() {
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        // Reader exited and dropped its sink.
                        break;
                    };
                    if send_frame(&mut ws_tx, &ShellFrame::from(event)).await.is_err() {
                        break;
                    }
                }
                msg = ws_rx.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(_)) | None => break,
                    };
                    let input = match msg {
                        Message::Text(text) => parse_inbound(text.as_str()),
                        Message::Binary(data) => {
                            parse_inbound(&String::from_utf8_lossy(&data))
                        }
                        Message::Close(_) => break,
                        Message::Ping(_) | Message::Pong(_) => None,
                    };
                    let Some(input) = input else {
                        continue;
                    };
                    if let Err(e) = session.send_command(&input).await {
                        let frame = ShellFrame::Error(format!("Failed to send command: {e}"));
                        if send_frame(&mut ws_tx, &frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    session.close_shell_if_current(generation).await;
    let _ = ws_tx.close().await;
    debug!(conn_id, "shell bridge closed");
}

async fn send_frame<S>(tx: &mut S, frame: &ShellFrame) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(frame) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
