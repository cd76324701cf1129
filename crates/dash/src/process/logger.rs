// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use crate::log_buffer::{LineBuffer, LogRecord};

/// Output log of one launched process: a [`LineBuffer`] backed by the
/// process's own log file.
#[derive(Debug)]
pub struct ProcessLogger {
    pid: u32,
    log_path: PathBuf,
    buffer: LineBuffer,
}

impl ProcessLogger {
    pub fn new(pid: u32, log_path: impl Into<PathBuf>, capacity: usize) -> Self {
        let log_path = log_path.into();
        let buffer = LineBuffer::with_file(capacity, &log_path);
        Self { pid, log_path, buffer }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn append(&self, line: impl Into<String>) -> LogRecord {
        self.buffer.append(line)
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.buffer.snapshot()
    }

    pub fn records_since(&self, cursor: u64) -> (Vec<LogRecord>, u64) {
        self.buffer.records_since(cursor)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
