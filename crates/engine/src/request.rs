// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pop requests and the rules that match them to workers

use crate::language_state::WorkerProcess;
use crate::worker::{Worker, WorkerLease};
use corral_core::{ActorId, JobId, Language, PopStatus, RuntimeEnvInfo, WorkerKind};
use std::time::Duration;

/// Identifies a pop request while it is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// What a caller needs from an execution worker
#[derive(Debug, Clone, PartialEq)]
pub struct PopRequest {
    pub language: Language,
    pub job_id: Option<JobId>,
    pub root_detached_actor: Option<ActorId>,
    pub is_gpu: Option<bool>,
    pub is_actor_worker: Option<bool>,
    /// Language-specific per-process flags; workers started with different
    /// options are never shared
    pub dynamic_options: Vec<String>,
    /// Overrides the default idle keep-alive window for this acquisition
    pub keep_alive: Option<Duration>,
    /// Queue behind the startup ceiling instead of failing
    pub queue_if_saturated: bool,
    runtime_env: RuntimeEnvInfo,
    runtime_env_hash: i32,
}

impl PopRequest {
    pub fn new(language: Language, job_id: Option<JobId>) -> Self {
        Self {
            language,
            job_id,
            root_detached_actor: None,
            is_gpu: None,
            is_actor_worker: None,
            dynamic_options: Vec::new(),
            keep_alive: None,
            queue_if_saturated: true,
            runtime_env: RuntimeEnvInfo::default(),
            runtime_env_hash: 0,
        }
    }

    pub fn with_runtime_env(mut self, runtime_env: RuntimeEnvInfo) -> Self {
        self.runtime_env_hash = runtime_env.hash();
        self.runtime_env = runtime_env;
        self
    }

    pub fn with_root_detached_actor(mut self, actor: ActorId) -> Self {
        self.root_detached_actor = Some(actor);
        self
    }

    pub fn with_dynamic_options(mut self, options: Vec<String>) -> Self {
        self.dynamic_options = options;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn with_gpu(mut self, is_gpu: bool) -> Self {
        self.is_gpu = Some(is_gpu);
        self
    }

    pub fn with_actor_worker(mut self, is_actor_worker: bool) -> Self {
        self.is_actor_worker = Some(is_actor_worker);
        self
    }

    pub fn without_queueing(mut self) -> Self {
        self.queue_if_saturated = false;
        self
    }

    pub fn runtime_env(&self) -> &RuntimeEnvInfo {
        &self.runtime_env
    }

    pub fn runtime_env_hash(&self) -> i32 {
        self.runtime_env_hash
    }
}

/// Result delivered to a pop callback
#[derive(Debug, Clone, PartialEq)]
pub struct PopOutcome {
    pub worker: Option<WorkerLease>,
    pub status: PopStatus,
    pub message: String,
}

impl PopOutcome {
    pub fn success(lease: WorkerLease) -> Self {
        Self {
            worker: Some(lease),
            status: PopStatus::Ok,
            message: String::new(),
        }
    }

    pub fn failure(status: PopStatus, message: impl Into<String>) -> Self {
        Self {
            worker: None,
            status,
            message: message.into(),
        }
    }
}

/// Receives the outcome of a pop request. Returns whether the caller took
/// the worker; a declined worker goes back through the release path.
pub type PopCallback = Box<dyn FnOnce(PopOutcome) -> bool>;

pub(crate) struct PendingPop {
    pub request: PopRequest,
    pub callback: PopCallback,
}

fn flags_compatible(worker: Option<bool>, request: Option<bool>) -> bool {
    match (worker, request) {
        (Some(w), Some(r)) => w == r,
        _ => true,
    }
}

/// Whether an idle worker may serve `request`
pub(crate) fn worker_fits(worker: &Worker, request: &PopRequest) -> bool {
    if worker.kind != WorkerKind::Worker
        || worker.language != request.language
        || worker.runtime_env_hash != request.runtime_env_hash
        || worker.exit_in_flight
    {
        return false;
    }
    if let Some(job) = worker.job_id {
        if request.job_id != Some(job) {
            return false;
        }
    }
    if let Some(actor) = &worker.root_detached_actor {
        if request.root_detached_actor.as_ref() != Some(actor) {
            return false;
        }
    }
    flags_compatible(worker.is_gpu, request.is_gpu)
        && flags_compatible(worker.is_actor_worker, request.is_actor_worker)
        && worker.dynamic_options == request.dynamic_options
}

/// Whether a still-starting process could eventually serve `request`
pub(crate) fn process_fits(process: &WorkerProcess, request: &PopRequest) -> bool {
    process.kind == WorkerKind::Worker
        && process.language == request.language
        && process.runtime_env.hash() == request.runtime_env_hash
        && process.job_id.is_none_or(|job| request.job_id == Some(job))
        && process.dynamic_options == request.dynamic_options
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
