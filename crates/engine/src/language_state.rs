// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bookkeeping for one language runtime

use crate::io_pool::IoPool;
use crate::request::RequestId;
use corral_adapters::ProcessHandle;
use corral_core::{
    IoWorkerKind, JobId, Language, RuntimeEnvInfo, StartupToken, WorkerId, WorkerKind,
};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

/// A spawned OS process and the workers it hosts
#[derive(Debug, Clone)]
pub(crate) struct WorkerProcess {
    pub handle: ProcessHandle,
    pub token: StartupToken,
    pub language: Language,
    pub kind: WorkerKind,
    pub job_id: Option<JobId>,
    /// Reference held at the gate for the life of the process, if non-trivial
    pub runtime_env: RuntimeEnvInfo,
    pub dynamic_options: Vec<String>,
    pub keep_alive: Option<Duration>,
    /// Workers registered so far
    pub workers: Vec<WorkerId>,
    /// Workers the process was started to host
    pub expected_workers: usize,
    /// Holds a startup slot until its first worker announces readiness
    pub starting: bool,
    pub created_at: Instant,
    /// Counts toward the first Python driver's registration wait
    pub for_first_driver: bool,
}

/// Everything a spawn needs, captured before the runtime env is ready
#[derive(Debug, Clone)]
pub(crate) struct SpawnSpec {
    pub language: Language,
    pub kind: WorkerKind,
    pub job_id: Option<JobId>,
    pub runtime_env: RuntimeEnvInfo,
    pub dynamic_options: Vec<String>,
    pub keep_alive: Option<Duration>,
    pub request: Option<RequestId>,
    pub for_first_driver: bool,
}

impl SpawnSpec {
    pub fn bare(language: Language, kind: WorkerKind) -> Self {
        Self {
            language,
            kind,
            job_id: None,
            runtime_env: RuntimeEnvInfo::default(),
            dynamic_options: Vec::new(),
            keep_alive: None,
            request: None,
            for_first_driver: false,
        }
    }
}

/// Per-language pool state
#[derive(Default)]
pub(crate) struct LanguageState {
    /// Processes keyed by startup token; each leaves exactly once
    pub processes: BTreeMap<StartupToken, WorkerProcess>,
    /// Execution-worker startup slots held, including runtime env waits
    pub starting: usize,
    pub pending_start: VecDeque<RequestId>,
    pub pending_registration: VecDeque<RequestId>,
    pub spill: IoPool,
    pub restore: IoPool,
}

impl LanguageState {
    pub fn io(&self, kind: IoWorkerKind) -> &IoPool {
        match kind {
            IoWorkerKind::Spill => &self.spill,
            IoWorkerKind::Restore => &self.restore,
        }
    }

    pub fn io_mut(&mut self, kind: IoWorkerKind) -> &mut IoPool {
        match kind {
            IoWorkerKind::Spill => &mut self.spill,
            IoWorkerKind::Restore => &mut self.restore,
        }
    }

    pub fn remove_pending(&mut self, id: RequestId) {
        self.pending_start.retain(|r| *r != id);
        self.pending_registration.retain(|r| *r != id);
    }

    /// Starting execution-worker processes whose env hash is `hash`
    pub fn starting_with_hash(&self, hash: i32) -> usize {
        self.processes
            .values()
            .filter(|p| p.starting && p.kind == WorkerKind::Worker && p.runtime_env.hash() == hash)
            .count()
    }
}
