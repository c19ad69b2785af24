// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake process launcher for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{LaunchError, ProcessHandle, ProcessLauncher};
use std::sync::{Arc, Mutex};

/// Recorded launcher call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchCall {
    Spawn {
        argv: Vec<String>,
        env: Vec<(String, String)>,
        pid: u32,
    },
    Kill {
        pid: u32,
    },
}

#[derive(Default)]
struct FakeLauncherState {
    calls: Vec<LaunchCall>,
    next_pid: u32,
    fail_spawns: Option<String>,
}

/// Fake launcher that hands out sequential pids without starting anything
#[derive(Clone, Default)]
pub struct FakeLauncher {
    inner: Arc<Mutex<FakeLauncherState>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<LaunchCall> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).calls.clone()
    }

    /// Number of processes spawned so far
    pub fn spawn_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LaunchCall::Spawn { .. }))
            .count()
    }

    /// Argv of the most recent spawn
    pub fn last_argv(&self) -> Option<Vec<String>> {
        self.calls().into_iter().rev().find_map(|c| match c {
            LaunchCall::Spawn { argv, .. } => Some(argv),
            LaunchCall::Kill { .. } => None,
        })
    }

    /// Environment of the most recent spawn
    pub fn last_env(&self) -> Option<Vec<(String, String)>> {
        self.calls().into_iter().rev().find_map(|c| match c {
            LaunchCall::Spawn { env, .. } => Some(env),
            LaunchCall::Kill { .. } => None,
        })
    }

    /// Pids passed to `kill`, in order
    pub fn killed(&self) -> Vec<u32> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                LaunchCall::Kill { pid } => Some(*pid),
                LaunchCall::Spawn { .. } => None,
            })
            .collect()
    }

    /// Make every subsequent spawn fail with `message` (or succeed again with `None`)
    pub fn set_spawn_failure(&self, message: Option<&str>) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).fail_spawns =
            message.map(str::to_string);
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn(
        &self,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ProcessHandle, LaunchError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(message) = &state.fail_spawns {
            return Err(LaunchError::SpawnFailed(message.clone()));
        }
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        state.calls.push(LaunchCall::Spawn {
            argv: argv.to_vec(),
            env: env.to_vec(),
            pid,
        });
        Ok(ProcessHandle::new(pid))
    }

    fn kill(&self, handle: ProcessHandle) -> Result<(), LaunchError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .push(LaunchCall::Kill { pid: handle.pid });
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
