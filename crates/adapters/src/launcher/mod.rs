// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process launching adapters

mod command;

pub use command::CommandLauncher;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLauncher, LaunchCall};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from launching or killing processes
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("kill failed for pid {pid}: {message}")]
    KillFailed { pid: u32, message: String },
}

/// Opaque handle to a spawned OS process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub pid: u32,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }
}

/// Spawns and kills worker processes
///
/// `spawn` returns as soon as the OS has created the process; readiness is
/// observed separately when the worker registers.
pub trait ProcessLauncher: Clone + Send + Sync + 'static {
    fn spawn(
        &self,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ProcessHandle, LaunchError>;

    /// Forcefully terminate a process. Already-exited processes are not an error.
    fn kill(&self, handle: ProcessHandle) -> Result<(), LaunchError>;
}
