// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::ansi::AnsiFilter;
use crate::config::Config;
use crate::process::{ProcessTable, TableSettings};
use crate::remote::{RemoteClient, SessionRegistry, SessionSettings};
use crate::store::{JsonStore, MonitorConfig, SshConfig};

/// Shared application state passed to all handlers via axum `State` extractor.
pub struct AppState {
    pub config: Config,
    pub base_dir: PathBuf,
    pub registry: SessionRegistry,
    pub processes: Arc<ProcessTable>,
    pub ssh_store: JsonStore<SshConfig>,
    pub monitor_store: JsonStore<MonitorConfig>,
    pub client: Arc<dyn RemoteClient>,
    pub filter: Arc<AnsiFilter>,
    pub session_settings: SessionSettings,
    pub started_at: Instant,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every component from a validated `config`, connecting remote
    /// sessions through `client`.
    pub fn new(config: Config, client: Arc<dyn RemoteClient>) -> anyhow::Result<Self> {
        let filter = Arc::new(AnsiFilter::new().context("compiling ANSI filter")?);
        let settings = TableSettings {
            logs_dir: config.logs_dir(),
            log_capacity: config.log_capacity,
            stop_timeout: config.stop_timeout(),
        };
        let processes = Arc::new(ProcessTable::new(Arc::clone(&filter), settings));
        let session_settings = SessionSettings {
            poll_interval: config.shell_poll(),
            disconnect_wait: config.disconnect_wait(),
            exec_timeout: config.exec_timeout(),
        };

        Ok(Self {
            base_dir: config.base_dir(),
            registry: SessionRegistry::new(),
            processes,
            ssh_store: JsonStore::new(config.ssh_config_path()),
            monitor_store: JsonStore::new(config.monitor_config_path()),
            client,
            filter,
            session_settings,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
            config,
        })
    }
}
