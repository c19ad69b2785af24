// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-based exit client

use super::{ExitClient, ExitError};
use async_trait::async_trait;
use corral_core::WorkerId;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::time::Duration;

/// Delivers exit requests as SIGTERM (graceful) or SIGKILL (force)
///
/// A graceful exit is accepted only once the process is gone; a process
/// still alive after the grace period declined. A worker that already
/// exited counts as having accepted.
#[derive(Clone, Copy, Debug)]
pub struct SignalExitClient {
    grace: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl Default for SignalExitClient {
    fn default() -> Self {
        Self::with_grace(Duration::from_secs(2))
    }
}

impl SignalExitClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self { grace }
    }
}

/// Zombies still answer signal probes, so check the process state too
fn is_alive(pid: Pid) -> bool {
    if let Err(Errno::ESRCH) = kill(pid, None) {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z' && state != 'X'),
        Err(_) => true,
    }
}

#[async_trait]
impl ExitClient for SignalExitClient {
    async fn exit(&self, worker_id: &WorkerId, pid: u32, force: bool) -> Result<bool, ExitError> {
        let raw = i32::try_from(pid).map_err(|_| ExitError::Delivery {
            worker_id: worker_id.clone(),
            message: format!("pid {} out of range", pid),
        })?;
        let pid = Pid::from_raw(raw);
        let signal = if force {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        match kill(pid, signal) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(true),
            Err(e) => {
                return Err(ExitError::Delivery {
                    worker_id: worker_id.clone(),
                    message: e.to_string(),
                });
            }
        }
        if force {
            return Ok(true);
        }

        let deadline = tokio::time::Instant::now() + self.grace;
        while is_alive(pid) {
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(worker = %worker_id, pid = raw, "worker still alive after SIGTERM");
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_terminates_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let client = SignalExitClient::new();
        let accepted = client.exit(&WorkerId::from("w-1"), pid, false).await.unwrap();
        assert!(accepted);

        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn exit_of_reaped_process_is_accepted() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        let client = SignalExitClient::new();
        assert!(client.exit(&WorkerId::from("w-1"), pid, true).await.unwrap());
    }

    #[tokio::test]
    async fn worker_ignoring_term_declines() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let client = SignalExitClient::with_grace(Duration::from_millis(200));
        let accepted = client.exit(&WorkerId::from("w-1"), pid, false).await.unwrap();
        assert!(!accepted);
        assert!(is_alive(Pid::from_raw(pid as i32)));

        child.kill().await.unwrap();
    }
}
