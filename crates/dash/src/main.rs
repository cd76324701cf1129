// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use opsdash::config::Config;
use opsdash::remote::russh_client::RusshClient;
use opsdash::transport::{build_router, AppState};

#[tokio::main]
async fn main() {
    let config = Config::parse();
    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let logs_dir = config.logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("creating logs dir {}", logs_dir.display()))?;

    let client = Arc::new(RusshClient::new(config.host_key_policy()?, config.connect_timeout()));
    let addr = format!("{}:{}", config.host, config.port);
    let reap_interval = config.reap_interval();
    let state = Arc::new(AppState::new(config, client)?);
    state.ssh_store.ensure_exists()?;
    state.monitor_store.ensure_exists()?;
    let shutdown = state.shutdown.clone();

    let reaper = state.processes.spawn_reaper(reap_interval, shutdown.clone());
    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(base_dir = %state.base_dir.display(), logs_dir = %logs_dir.display(), "HTTP listening on {addr}");

    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("HTTP server error")?;

    info!("shutting down");
    shutdown.cancel();
    let _ = reaper.await;
    state.registry.shutdown().await;
    state.processes.shutdown();
    Ok(())
}

fn spawn_signal_handler(sd: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
                sd.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
                sd.cancel();
            }
        }
    });
}
