// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ProcessLogger;
use crate::ansi::AnsiFilter;

/// Drains a child's stdout and stderr into its [`ProcessLogger`].
pub struct OutputCapture;

impl OutputCapture {
    /// Start one pump per stream. Each runs until its stream reaches EOF.
    pub fn attach<O, E>(
        logger: Arc<ProcessLogger>,
        filter: Arc<AnsiFilter>,
        stdout: O,
        stderr: E,
    ) -> CaptureHandle
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let stdout = tokio::spawn(pump("stdout", stdout, Arc::clone(&logger), Arc::clone(&filter)));
        let stderr = tokio::spawn(pump("stderr", stderr, logger, filter));
        CaptureHandle { stdout, stderr }
    }
}

/// The two pump tasks of one capture.
#[derive(Debug)]
pub struct CaptureHandle {
    stdout: JoinHandle<()>,
    stderr: JoinHandle<()>,
}

impl CaptureHandle {
    /// Both streams have reached EOF (or failed).
    pub fn is_finished(&self) -> bool {
        self.stdout.is_finished() && self.stderr.is_finished()
    }

    pub async fn join(self) {
        let _ = self.stdout.await;
        let _ = self.stderr.await;
    }
}

/// Lines handed to the blocking pool in one hop at most.
const MAX_BATCH: usize = 256;

async fn pump<R>(stream: &'static str, reader: R, logger: Arc<ProcessLogger>, filter: Arc<AnsiFilter>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut done = false;
    while !done {
        // Take every complete line already buffered, then persist them together.
        let mut batch = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => done = true,
                Ok(_) => batch.push(filter.strip_bytes(&line).trim_end().to_owned()),
                Err(e) => {
                    batch.push(format!("Error reading {stream}: {e}"));
                    done = true;
                }
            }
            if done || batch.len() >= MAX_BATCH || !reader.buffer().contains(&b'\n') {
                break;
            }
        }
        if !batch.is_empty() {
            persist(&logger, batch).await;
        }
    }
    debug!(pid = logger.pid(), stream, "output pump finished");
}

/// Append `lines` in order on the blocking pool; the file write stays off
/// the async workers.
async fn persist(logger: &Arc<ProcessLogger>, lines: Vec<String>) {
    let target = Arc::clone(logger);
    let appended = tokio::task::spawn_blocking(move || {
        for line in lines {
            target.append(line);
        }
    })
    .await;
    if let Err(e) = appended {
        warn!(pid = logger.pid(), err = %e, "log append task failed");
    }
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
