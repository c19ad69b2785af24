// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker records owned by the pool

use corral_adapters::ProcessHandle;
use corral_core::{ActorId, JobId, Language, StartupToken, TaskId, WorkerId, WorkerKind};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Where a worker is in its lifecycle
///
/// Records are dropped from the pool once a worker disconnects or accepts
/// an exit request, so there is no terminal variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Connected, but has not announced readiness
    Registered,
    /// Started and sitting in the idle set
    Idle,
    /// Started and handed to a caller
    Busy,
}

/// A registered worker or driver
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: WorkerId,
    pub process: ProcessHandle,
    /// Token of the process that hosts this worker; drivers have none
    pub token: Option<StartupToken>,
    pub language: Language,
    pub kind: WorkerKind,
    pub job_id: Option<JobId>,
    pub runtime_env_hash: i32,
    pub dynamic_options: Vec<String>,
    pub state: WorkerState,
    pub port: Option<u16>,
    pub assigned_task: Option<TaskId>,
    pub root_detached_actor: Option<ActorId>,
    pub is_gpu: Option<bool>,
    pub is_actor_worker: Option<bool>,
    /// Per-acquisition override of the idle keep-alive window
    pub keep_alive: Option<Duration>,
    pub idle_since: Option<Instant>,
    /// An exit request was sent and its reply has not arrived
    pub exit_in_flight: bool,
}

impl Worker {
    pub fn is_started(&self) -> bool {
        self.state != WorkerState::Registered
    }

    pub fn is_idle(&self) -> bool {
        self.state == WorkerState::Idle
    }

    pub fn lease(&self) -> WorkerLease {
        WorkerLease {
            worker_id: self.id.clone(),
            pid: self.process.pid,
            language: self.language,
            kind: self.kind,
            job_id: self.job_id,
            runtime_env_hash: self.runtime_env_hash,
            port: self.port,
            root_detached_actor: self.root_detached_actor.clone(),
        }
    }
}

/// Snapshot of a worker handed to a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLease {
    pub worker_id: WorkerId,
    pub pid: u32,
    pub language: Language,
    pub kind: WorkerKind,
    pub job_id: Option<JobId>,
    pub runtime_env_hash: i32,
    pub port: Option<u16>,
    pub root_detached_actor: Option<ActorId>,
}
