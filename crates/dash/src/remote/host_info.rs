// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU, memory and disk figures of a remote host, gathered with plain
//! commands over an established session.

use serde::Serialize;

use super::{RemoteError, RemoteSession};

const CPU_CORES_CMD: &str = "cat /proc/cpuinfo | grep 'cpu cores' | uniq | awk '{print $4}'";
const CPU_USAGE_CMD: &str = "top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | cut -d'%' -f1";
const MEMORY_CMD: &str = "free -m | grep 'Mem' | awk '{print $2, $3, $4}'";
const DISK_CMD: &str = "df -h | grep -E '^/dev/' | awk '{print $1, $2, $3, $4, $5, $6}'";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteSystemInfo {
    pub cpu: RemoteCpu,
    /// `None` when `free` output could not be read.
    pub memory: Option<RemoteMemory>,
    pub disk: Vec<RemoteDisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteCpu {
    pub cores: Option<u32>,
    pub usage_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteMemory {
    pub total_mb: u64,
    pub used_mb: u64,
    pub free_mb: u64,
    pub usage_percent: u64,
}

/// One `df -h` row, sizes kept in their human-readable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteDisk {
    pub device: String,
    pub size: String,
    pub used: String,
    pub available: String,
    pub use_percent: String,
    pub mount_point: String,
}

/// Run the four host commands on `session` one after another.
pub async fn collect(session: &RemoteSession) -> Result<RemoteSystemInfo, RemoteError> {
    let cores = parse_cores(&session.exec(CPU_CORES_CMD).await?.stdout);
    let usage_percent = parse_usage(&session.exec(CPU_USAGE_CMD).await?.stdout);
    let memory = parse_memory(&session.exec(MEMORY_CMD).await?.stdout);
    let disk = parse_disks(&session.exec(DISK_CMD).await?.stdout);
    Ok(RemoteSystemInfo { cpu: RemoteCpu { cores, usage_percent }, memory, disk })
}

pub(crate) fn parse_cores(out: &str) -> Option<u32> {
    out.lines().next()?.trim().parse().ok()
}

/// `top` prints a decimal comma under some locales.
pub(crate) fn parse_usage(out: &str) -> Option<f64> {
    out.lines().next()?.trim().replace(',', ".").parse().ok()
}

pub(crate) fn parse_memory(out: &str) -> Option<RemoteMemory> {
    let fields: Vec<u64> =
        out.split_whitespace().map(str::parse).collect::<Result<_, _>>().ok()?;
    let &[total_mb, used_mb, free_mb] = fields.as_slice() else {
        return None;
    };
    let usage_percent = if total_mb == 0 { 0 } else { used_mb * 100 / total_mb };
    Some(RemoteMemory { total_mb, used_mb, free_mb, usage_percent })
}

pub(crate) fn parse_disks(out: &str) -> Vec<RemoteDisk> {
    out.lines()
        .filter_map(|line| {
            let f: Vec<&str> = line.split_whitespace().collect();
            if f.len() < 6 {
                return None;
            }
            Some(RemoteDisk {
                device: f[0].to_owned(),
                size: f[1].to_owned(),
                used: f[2].to_owned(),
                available: f[3].to_owned(),
                use_percent: f[4].to_owned(),
                mount_point: f[5..].join(" "),
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "host_info_tests.rs"]
mod tests;
