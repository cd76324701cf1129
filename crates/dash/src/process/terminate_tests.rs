// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use nix::unistd::Pid;

use super::{alive, stop_pid, to_pid, StopOutcome};
use crate::process::ProcessError;

#[test]
fn to_pid_rejects_zero_and_self() {
    assert_eq!(to_pid(0), Err(ProcessError::InvalidPid(0)));
    assert_eq!(to_pid(u32::MAX), Err(ProcessError::InvalidPid(u32::MAX)));
    let own = std::process::id();
    assert_eq!(to_pid(own), Err(ProcessError::InvalidPid(own)));
    assert_eq!(to_pid(12345), Ok(Pid::from_raw(12345)));
}

#[yare::parameterized(
    terminated = { StopOutcome::Terminated, "Process 9 terminated successfully" },
    killed     = { StopOutcome::Killed, "Process 9 killed forcefully" },
    gone       = { StopOutcome::AlreadyExited, "Process 9 had already exited" },
)]
fn outcome_messages(outcome: StopOutcome, expected: &str) {
    assert_eq!(outcome.message(9), expected);
}

#[tokio::test]
async fn stop_pid_terminates_sleeper() -> anyhow::Result<()> {
    let mut child = tokio::process::Command::new("sleep").arg("30").spawn()?;
    let Some(pid) = child.id() else {
        anyhow::bail!("sleep exited early");
    };

    // Reap concurrently so the liveness check sees the pid disappear.
    let waiter = tokio::spawn(async move { child.wait().await });
    let outcome = stop_pid(pid, Duration::from_secs(5)).await?;
    assert_eq!(outcome, StopOutcome::Terminated);
    waiter.await??;
    assert!(!alive(Pid::from_raw(pid as i32)));
    Ok(())
}

#[tokio::test]
async fn stop_pid_unknown_is_not_found() -> anyhow::Result<()> {
    let mut child = tokio::process::Command::new("true").spawn()?;
    let Some(pid) = child.id() else {
        anyhow::bail!("no pid");
    };
    child.wait().await?;
    assert_eq!(stop_pid(pid, Duration::from_millis(100)).await, Err(ProcessError::NotFound(pid)));
    Ok(())
}
