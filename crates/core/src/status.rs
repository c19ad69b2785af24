// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outcome status reported to acquisition callbacks

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a pop request did or did not yield a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopStatus {
    Ok,
    /// The request named a job this node has no record of
    JobConfigMissing,
    /// The job finished before or while the request was pending
    JobFinished,
    /// No worker registered before the registration timeout elapsed
    WorkerPendingRegistration,
    /// The runtime environment gate reported a failure
    RuntimeEnvCreationFailed,
    /// The startup ceiling was reached and the caller opted out of queuing
    TooManyStartingWorkerProcesses,
    /// The launcher could not create the process
    SpawnFailed,
    /// The pool shut down before the request was served
    PoolShuttingDown,
}

impl PopStatus {
    pub fn is_ok(self) -> bool {
        self == PopStatus::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PopStatus::Ok => "ok",
            PopStatus::JobConfigMissing => "job_config_missing",
            PopStatus::JobFinished => "job_finished",
            PopStatus::WorkerPendingRegistration => "worker_pending_registration",
            PopStatus::RuntimeEnvCreationFailed => "runtime_env_creation_failed",
            PopStatus::TooManyStartingWorkerProcesses => "too_many_starting_worker_processes",
            PopStatus::SpawnFailed => "spawn_failed",
            PopStatus::PoolShuttingDown => "pool_shutting_down",
        }
    }
}

impl fmt::Display for PopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
