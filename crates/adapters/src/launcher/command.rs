// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS process launcher

use super::{LaunchError, ProcessHandle, ProcessLauncher};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;

/// Launches workers as child processes of the daemon
///
/// Children are detached from the returned handle; the tokio runtime reaps
/// them once they exit. Must be called from within a tokio runtime.
#[derive(Clone, Default)]
pub struct CommandLauncher;

impl CommandLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for CommandLauncher {
    fn spawn(
        &self,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ProcessHandle, LaunchError> {
        let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;

        let child = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(std::process::Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| LaunchError::SpawnFailed(format!("{}: {}", program, e)))?;

        let pid = child
            .id()
            .ok_or_else(|| LaunchError::SpawnFailed(format!("{}: exited immediately", program)))?;

        Ok(ProcessHandle::new(pid))
    }

    fn kill(&self, handle: ProcessHandle) -> Result<(), LaunchError> {
        let pid = i32::try_from(handle.pid).map_err(|_| LaunchError::KillFailed {
            pid: handle.pid,
            message: "pid out of range".to_string(),
        })?;
        match kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(LaunchError::KillFailed {
                pid: handle.pid,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
