// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::OsString;

use super::{describe_interpreter, percent, process_details, top_processes, ProcessUsage};

fn cmd(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

#[test]
fn script_invocation() {
    let found = describe_interpreter(42, &cmd(&["python3", "/srv/jobs/etl.py", "--full"]), 0);
    let Some(found) = found else {
        unreachable!("script invocation should be described");
    };
    assert_eq!(found.pid, 42);
    assert_eq!(found.script_name, "etl.py");
    assert_eq!(found.script_path, "/srv/jobs/etl.py");
    assert_eq!(found.cmdline, "python3 /srv/jobs/etl.py --full");
}

#[yare::parameterized(
    inline   = { &["python3", "-c", "print(1)"], Some("python -c command") },
    bare     = { &["python3"], Some("python interpreter") },
    module   = { &["python3", "-m", "http.server"], None },
    empty    = { &[], None },
)]
fn classification(args: &[&str], expected: Option<&str>) {
    let found = describe_interpreter(1, &cmd(args), 0);
    assert_eq!(found.map(|p| p.script_name).as_deref(), expected);
}

#[test]
fn percent_handles_zero_total() {
    assert_eq!(percent(5, 0), 0.0);
    assert_eq!(percent(25, 100), 25.0);
}

#[test]
fn top_processes_sorted_and_capped() {
    let usage: Vec<ProcessUsage> = (0..8)
        .map(|i| ProcessUsage {
            pid: i,
            name: format!("p{i}"),
            cpu_percent: i as f32,
            memory_percent: (8 - i) as f64,
        })
        .collect();
    let top = top_processes(usage);
    assert_eq!(top.cpu.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![7, 6, 5, 4, 3]);
    assert_eq!(top.memory.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn details_of_a_running_child() -> anyhow::Result<()> {
    let mut child = std::process::Command::new("sleep").arg("30").spawn()?;
    let details = process_details(child.id());
    child.kill()?;
    child.wait()?;

    let details = details.ok_or_else(|| anyhow::anyhow!("child not found"))?;
    assert!(details.name_matches("SLEEP"), "{details:?}");
    assert!(!details.name_matches("python"));
    assert_eq!(details.cmdline, "sleep 30");
    assert!(!details.create_time.is_empty());
    Ok(())
}

#[test]
fn details_of_a_missing_pid() {
    assert_eq!(process_details(u32::MAX - 1), None);
}
