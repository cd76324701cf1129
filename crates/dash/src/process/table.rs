// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures_util::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::terminate::{self, StopOutcome};
use super::{
    log_file_name, CaptureHandle, ExitInfo, OutputCapture, ProcessError, ProcessLogger,
    ProcessSpec, ProcessSummary, RunStatus, TailEvent,
};
use crate::ansi::AnsiFilter;
use crate::log_buffer::LogRecord;

/// Tuning for a [`ProcessTable`].
#[derive(Debug, Clone)]
pub struct TableSettings {
    pub logs_dir: PathBuf,
    pub log_capacity: usize,
    pub stop_timeout: Duration,
}

/// One process launched by this server.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: u32,
    script_path: PathBuf,
    started_at: DateTime<Local>,
    logger: Arc<ProcessLogger>,
    capture: CaptureHandle,
    exit: watch::Receiver<Option<ExitInfo>>,
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn logger(&self) -> &Arc<ProcessLogger> {
        &self.logger
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.exit.borrow().clone()
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Exited and both output pumps have drained their streams.
    pub fn is_finished(&self) -> bool {
        self.has_exited() && self.capture.is_finished()
    }

    /// Wait until the process has exited.
    pub async fn wait(&self) -> ExitInfo {
        let mut exit = self.exit.clone();
        loop {
            if let Some(info) = exit.borrow_and_update().clone() {
                return info;
            }
            if exit.changed().await.is_err() {
                // Waiter task gone without reporting; treat as exited now.
                return ExitInfo { code: None, signal: None, exited_at: Local::now() };
            }
        }
    }

    pub fn summary(&self) -> ProcessSummary {
        let exit = self.exit_info();
        ProcessSummary {
            pid: self.pid,
            script_path: self.script_path.clone(),
            started_at: self.started_at,
            status: if exit.is_some() { RunStatus::Exited } else { RunStatus::Running },
            exit,
            log_path: self.logger.log_path().to_path_buf(),
            records: self.logger.len(),
        }
    }
}

/// Processes launched by this server, keyed by pid.
///
/// Entries outlive their process for a grace period so the tail stays
/// readable, then the reaper drops them. Log files are never removed.
pub struct ProcessTable {
    processes: Mutex<HashMap<u32, Arc<ManagedProcess>>>,
    filter: Arc<AnsiFilter>,
    settings: TableSettings,
}

impl ProcessTable {
    pub fn new(filter: Arc<AnsiFilter>, settings: TableSettings) -> Self {
        Self { processes: Mutex::new(HashMap::new()), filter, settings }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.settings.logs_dir
    }

    /// Launch `spec` in its own process group with both output streams captured.
    pub fn spawn(&self, spec: ProcessSpec) -> Result<Arc<ManagedProcess>, ProcessError> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(ref cwd) = spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child =
            cmd.spawn().map_err(|e| ProcessError::Spawn(format!("{}: {e}", spec.program)))?;
        let Some(pid) = child.id() else {
            return Err(ProcessError::Spawn("child exited before reporting a pid".to_owned()));
        };
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            return Err(ProcessError::Spawn("child output pipes unavailable".to_owned()));
        };

        if let Err(e) = std::fs::create_dir_all(&self.settings.logs_dir) {
            warn!(dir = %self.settings.logs_dir.display(), err = %e, "cannot create logs dir");
        }
        let started_at = Local::now();
        let log_path = self.settings.logs_dir.join(log_file_name(&spec.label, pid, started_at));
        let logger = Arc::new(ProcessLogger::new(pid, log_path, self.settings.log_capacity));
        let capture =
            OutputCapture::attach(Arc::clone(&logger), Arc::clone(&self.filter), stdout, stderr);

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let info = match child.wait().await {
                Ok(status) => ExitInfo::from_status(status),
                Err(e) => {
                    warn!(pid, err = %e, "failed to wait on child");
                    ExitInfo { code: None, signal: None, exited_at: Local::now() }
                }
            };
            debug!(pid, code = ?info.code, signal = ?info.signal, "child exited");
            let _ = exit_tx.send(Some(info));
        });

        let process = Arc::new(ManagedProcess {
            pid,
            script_path: spec.script_path,
            started_at,
            logger,
            capture,
            exit: exit_rx,
        });
        self.processes.lock().insert(pid, Arc::clone(&process));
        info!(pid, program = %spec.program, args = ?spec.args, "process started");
        Ok(process)
    }

    pub fn get(&self, pid: u32) -> Option<Arc<ManagedProcess>> {
        self.processes.lock().get(&pid).cloned()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.processes.lock().contains_key(&pid)
    }

    pub fn remove(&self, pid: u32) -> Option<Arc<ManagedProcess>> {
        self.processes.lock().remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summaries(&self) -> Vec<ProcessSummary> {
        let processes: Vec<Arc<ManagedProcess>> = self.processes.lock().values().cloned().collect();
        let mut summaries: Vec<ProcessSummary> = processes.iter().map(|p| p.summary()).collect();
        summaries.sort_by_key(|s| s.pid);
        summaries
    }

    /// Stop a managed process and drop its entry.
    pub async fn stop(&self, pid: u32) -> Result<StopOutcome, ProcessError> {
        let process = self.get(pid).ok_or(ProcessError::NotFound(pid))?;
        let outcome =
            terminate::stop_group(pid, process.exit.clone(), self.settings.stop_timeout).await?;
        self.remove(pid);
        info!(pid, ?outcome, "process stopped");
        Ok(outcome)
    }

    /// Stop any process by pid; managed ones go through [`stop`](Self::stop).
    pub async fn kill(&self, pid: u32) -> Result<StopOutcome, ProcessError> {
        if self.contains(pid) {
            return self.stop(pid).await;
        }
        let outcome = terminate::stop_pid(pid, self.settings.stop_timeout).await?;
        info!(pid, ?outcome, "process killed");
        Ok(outcome)
    }

    /// Currently retained records of a managed process, oldest first.
    pub fn list_records(&self, pid: u32) -> Result<Vec<LogRecord>, ProcessError> {
        let process = self.get(pid).ok_or(ProcessError::NotFound(pid))?;
        Ok(process.logger.records())
    }

    /// Lazily yield records appended after `cursor`, polling every `poll`.
    ///
    /// Ends with [`TailEvent::End`] once the process has exited and its
    /// output has drained, or once its entry is gone. Each record carries
    /// its `seq`, so a client resumes with `seq + 1`.
    pub fn stream_records(
        self: &Arc<Self>,
        pid: u32,
        cursor: u64,
        poll: Duration,
    ) -> Result<impl Stream<Item = TailEvent> + Send + 'static, ProcessError> {
        if !self.contains(pid) {
            return Err(ProcessError::NotFound(pid));
        }
        let state = TailState { table: Arc::clone(self), pid, cursor, poll, started: false };
        let polls = stream::unfold(Some(state), |state| async move {
            let Some(mut state) = state else {
                return None;
            };
            if state.started {
                tokio::time::sleep(state.poll).await;
            }
            state.started = true;

            let Some(process) = state.table.get(state.pid) else {
                return Some((vec![TailEvent::End], None));
            };
            let finished = process.is_finished();
            let (records, next) = process.logger.records_since(state.cursor);
            state.cursor = next;
            let mut events: Vec<TailEvent> = records.into_iter().map(TailEvent::Record).collect();
            if finished {
                events.push(TailEvent::End);
                return Some((events, None));
            }
            Some((events, Some(state)))
        });
        Ok(polls.flat_map(stream::iter))
    }

    /// Drop entries that finished at least `grace` ago. Returns their pids.
    pub fn reap_finished(&self, grace: Duration) -> Vec<u32> {
        let now = Local::now();
        let mut processes = self.processes.lock();
        let expired: Vec<u32> = processes
            .values()
            .filter(|p| p.capture.is_finished())
            .filter(|p| {
                p.exit_info().is_some_and(|info| {
                    (now - info.exited_at).to_std().is_ok_and(|elapsed| elapsed >= grace)
                })
            })
            .map(|p| p.pid)
            .collect();
        for pid in &expired {
            processes.remove(pid);
        }
        expired
    }

    /// Periodically reap finished entries until `shutdown` is cancelled.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let table = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = table.reap_finished(interval);
                        if !reaped.is_empty() {
                            debug!(?reaped, "reaped finished processes");
                        }
                    }
                }
            }
        })
    }

    /// Release the table. Children keep running in their own process groups.
    pub fn shutdown(&self) {
        let processes: Vec<Arc<ManagedProcess>> =
            self.processes.lock().drain().map(|(_, p)| p).collect();
        let running: Vec<u32> =
            processes.iter().filter(|p| !p.has_exited()).map(|p| p.pid).collect();
        if !running.is_empty() {
            info!(?running, "leaving launched processes running");
        }
    }
}

struct TailState {
    table: Arc<ProcessTable>,
    pid: u32,
    cursor: u64,
    poll: Duration,
    started: bool,
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
