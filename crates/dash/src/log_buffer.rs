// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory line ring with an append-only file sink.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One timestamped line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Position in the buffer's total append history, starting at 0.
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl LogRecord {
    /// Render as `[YYYY-MM-DD HH:MM:SS] text`, the on-disk line format.
    pub fn line(&self) -> String {
        format!("[{}] {}", self.timestamp.format(TIMESTAMP_FORMAT), self.text)
    }
}

#[derive(Debug)]
struct Ring {
    records: VecDeque<LogRecord>,
    capacity: usize,
    total_written: u64,
}

/// Fixed-capacity FIFO of [`LogRecord`]s.
///
/// Every appended record is also written to the file sink, so eviction only
/// drops the in-memory copy. The ring lock is held only while the deque is
/// mutated or copied; file writes happen under a separate lock that also
/// keeps file order identical to ring order. Each record reaches the file
/// in one write. `append` does blocking file I/O; async callers run it on
/// the blocking pool.
#[derive(Debug)]
pub struct LineBuffer {
    ring: Mutex<Ring>,
    sink: Mutex<Option<BufWriter<File>>>,
    path: Option<PathBuf>,
}

impl LineBuffer {
    /// Memory-only buffer.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                records: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                total_written: 0,
            }),
            sink: Mutex::new(None),
            path: None,
        }
    }

    /// Buffer that also appends every record to `path`.
    ///
    /// A file that cannot be opened is logged and the buffer continues in
    /// memory only.
    pub fn with_file(capacity: usize, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "log file unavailable, keeping memory only");
                None
            }
        };
        let mut buf = Self::new(capacity);
        buf.sink = Mutex::new(file);
        buf.path = Some(path);
        buf
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a line stamped with the current local time.
    pub fn append(&self, text: impl Into<String>) -> LogRecord {
        let mut sink = self.sink.lock();
        let record = {
            let mut ring = self.ring.lock();
            let record =
                LogRecord { seq: ring.total_written, timestamp: Local::now(), text: text.into() };
            if ring.records.len() >= ring.capacity {
                ring.records.pop_front();
            }
            ring.records.push_back(record.clone());
            ring.total_written += 1;
            record
        };

        if let Some(file) = sink.as_mut() {
            let written = writeln!(file, "{}", record.line()).and_then(|()| file.flush());
            if let Err(e) = written {
                tracing::warn!(
                    path = ?self.path,
                    err = %e,
                    "failed to write log record to file"
                );
            }
        }
        record
    }

    /// Point-in-time copy of every retained record, oldest first.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.ring.lock().records.iter().cloned().collect()
    }

    /// Records with `seq >= cursor` plus the cursor for the next call.
    ///
    /// A cursor older than the oldest retained record resumes from the
    /// oldest one; a cursor past the end yields nothing.
    pub fn records_since(&self, cursor: u64) -> (Vec<LogRecord>, u64) {
        let ring = self.ring.lock();
        let oldest = ring.total_written - ring.records.len() as u64;
        let skip = cursor.saturating_sub(oldest) as usize;
        let records = ring.records.iter().skip(skip).cloned().collect();
        (records, ring.total_written.max(cursor))
    }

    /// Total number of records ever appended.
    pub fn total_written(&self) -> u64 {
        self.ring.lock().total_written
    }

    pub fn len(&self) -> usize {
        self.ring.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity
    }
}

#[cfg(test)]
#[path = "log_buffer_tests.rs"]
mod tests;
