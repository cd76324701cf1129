// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host resource snapshots. Every function here blocks; call them from
//! `spawn_blocking`.

use std::ffi::OsString;
use std::path::PathBuf;

use chrono::{Local, TimeZone};
use serde::Serialize;
use sysinfo::{Disks, Pid, ProcessesToUpdate, System};

use crate::log_buffer::TIMESTAMP_FORMAT;

const TOP_PROCESSES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct CpuInfo {
    pub percent: f32,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    pub device: String,
    pub mountpoint: PathBuf,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopProcesses {
    pub cpu: Vec<ProcessUsage>,
    pub memory: Vec<ProcessUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disks: Vec<DiskInfo>,
    pub top_processes: TopProcesses,
}

/// An interpreter process found on the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpreterProcess {
    pub pid: u32,
    pub script_name: String,
    pub script_path: String,
    pub cmdline: String,
    pub start_time: String,
}

/// A live host process the server does not manage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDetails {
    pub name: String,
    pub cmdline: String,
    pub status: String,
    pub create_time: String,
    pub cpu_percent: f32,
    /// Resident and virtual memory in bytes.
    pub memory_rss: u64,
    pub memory_virtual: u64,
}

impl ProcessDetails {
    /// Case-insensitive match of `pattern` against the process name.
    pub fn name_matches(&self, pattern: &str) -> bool {
        self.name.to_lowercase().contains(&pattern.to_lowercase())
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// CPU, memory, disks and the top CPU / memory consumers.
///
/// Samples CPU usage twice, sleeping the minimum update interval between.
pub fn collect() -> SystemSnapshot {
    let mut sys = System::new_all();
    sys.refresh_cpu_usage();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let total_memory = sys.total_memory();
    let memory = MemoryInfo {
        total: total_memory,
        available: sys.available_memory(),
        used: sys.used_memory(),
        percent: percent(sys.used_memory(), total_memory),
    };

    let disks = Disks::new_with_refreshed_list()
        .list()
        .iter()
        .map(|disk| {
            let total = disk.total_space();
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            DiskInfo {
                device: disk.name().to_string_lossy().into_owned(),
                mountpoint: disk.mount_point().to_path_buf(),
                total,
                used,
                free,
                percent: percent(used, total),
            }
        })
        .collect();

    let usage: Vec<ProcessUsage> = sys
        .processes()
        .iter()
        .map(|(pid, process)| ProcessUsage {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
            cpu_percent: process.cpu_usage(),
            memory_percent: percent(process.memory(), total_memory),
        })
        .collect();

    SystemSnapshot {
        cpu: CpuInfo { percent: sys.global_cpu_usage(), count: sys.cpus().len() },
        memory,
        disks,
        top_processes: top_processes(usage),
    }
}

fn top_processes(usage: Vec<ProcessUsage>) -> TopProcesses {
    let mut by_cpu = usage.clone();
    by_cpu.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
    by_cpu.truncate(TOP_PROCESSES);

    let mut by_memory = usage;
    by_memory.sort_by(|a, b| b.memory_percent.total_cmp(&a.memory_percent));
    by_memory.truncate(TOP_PROCESSES);

    TopProcesses { cpu: by_cpu, memory: by_memory }
}

/// Processes whose name contains `pattern` (case-insensitive), ordered by pid.
pub fn interpreter_processes(pattern: &str) -> Vec<InterpreterProcess> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    let pattern = pattern.to_lowercase();

    let mut found: Vec<InterpreterProcess> = sys
        .processes()
        .iter()
        .filter(|(_, process)| process.name().to_string_lossy().to_lowercase().contains(&pattern))
        .filter_map(|(pid, process)| {
            describe_interpreter(pid.as_u32(), process.cmd(), process.start_time())
        })
        .collect();
    found.sort_by_key(|p| p.pid);
    found
}

/// Name, command line and resource use of `pid`, or `None` if it is not running.
pub fn process_details(pid: u32) -> Option<ProcessDetails> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    let process = sys.process(pid)?;
    let cmdline = process
        .cmd()
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    Some(ProcessDetails {
        name: process.name().to_string_lossy().into_owned(),
        cmdline,
        status: process.status().to_string(),
        create_time: local_time(process.start_time()),
        cpu_percent: process.cpu_usage(),
        memory_rss: process.memory(),
        memory_virtual: process.virtual_memory(),
    })
}

fn local_time(epoch_secs: u64) -> String {
    Local
        .timestamp_opt(i64::try_from(epoch_secs).unwrap_or_default(), 0)
        .single()
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

/// Classify an interpreter command line: a script run, an inline `-c`
/// command, or a bare interpreter. Other invocations are skipped.
pub fn describe_interpreter(
    pid: u32,
    cmd: &[OsString],
    start_time: u64,
) -> Option<InterpreterProcess> {
    let args: Vec<String> = cmd.iter().map(|a| a.to_string_lossy().into_owned()).collect();
    let cmdline = args.join(" ");
    let start_time = local_time(start_time);

    let (script_name, script_path) = match args.get(1) {
        Some(script) if script.ends_with(".py") => {
            let name = std::path::Path::new(script)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| script.clone());
            (name, script.clone())
        }
        Some(_) if args.iter().any(|a| a == "-c") => {
            ("python -c command".to_owned(), "N/A".to_owned())
        }
        Some(_) => return None,
        None if args.is_empty() => return None,
        None => ("python interpreter".to_owned(), "N/A".to_owned()),
    };

    Some(InterpreterProcess { pid, script_name, script_path, cmdline, start_time })
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
