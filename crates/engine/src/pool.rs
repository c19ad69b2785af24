// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker pool
//!
//! A single-owner state machine. Every operation runs to completion on the
//! caller's thread; anything asynchronous leaves as an [`Effect`] and comes
//! back as a [`PoolEvent`]. Pop callbacks run synchronously while the pool
//! is mutably borrowed, so they cannot re-enter it.

use crate::command::WorkerCommand;
use crate::effect::{Effect, EnvTicket, PoolEvent, TimerId};
use crate::error::PoolError;
use crate::idle::IdleSet;
use crate::io_pool::IoPoolStats;
use crate::jobs::JobTable;
use crate::language_state::{LanguageState, SpawnSpec, WorkerProcess};
use crate::request::{process_fits, worker_fits, PendingPop, PopCallback, PopOutcome, PopRequest, RequestId};
use crate::worker::{Worker, WorkerState};
use corral_adapters::{ProcessHandle, ProcessLauncher};
use corral_core::{
    ActorId, Clock, IoWorkerKind, JobConfig, JobId, Language, NodeId, PoolConfig, PopStatus,
    RuntimeEnvInfo, StartupToken, TaskId, WorkerId, WorkerKind,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Live accessor for the node's currently available compute units
pub type Capacity = Box<dyn Fn() -> usize>;

/// Completes a driver registration
pub type DriverReady = Box<dyn FnOnce()>;

struct FirstDriverWait {
    remaining: usize,
    on_ready: DriverReady,
}

pub(crate) enum EnvWait {
    Spawn(SpawnSpec),
    JobEager(JobId),
}

/// Point-in-time counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub num_workers_starting: usize,
    pub num_pending_start_requests: usize,
    pub num_pending_registration_requests: usize,
    pub num_processes: usize,
    pub num_registered_workers: usize,
    pub num_drivers: usize,
    pub num_idle_workers: usize,
    pub soft_limit: usize,
    /// Idle execution workers per runtime env hash
    pub idle_by_runtime_env_hash: BTreeMap<i32, usize>,
    pub spill: IoPoolStats,
    pub restore: IoPoolStats,
}

/// Pool of language worker processes
pub struct WorkerPool<L, C> {
    pub(crate) config: PoolConfig,
    node_id: NodeId,
    pub(crate) launcher: L,
    pub(crate) clock: C,
    capacity: Capacity,
    pub(crate) languages: BTreeMap<Language, LanguageState>,
    pub(crate) workers: HashMap<WorkerId, Worker>,
    pub(crate) idle: IdleSet,
    pub(crate) jobs: JobTable,
    pub(crate) requests: HashMap<RequestId, PendingPop>,
    pub(crate) env_waits: HashMap<EnvTicket, EnvWait>,
    pub(crate) effects: Vec<Effect>,
    next_token: StartupToken,
    next_request: u64,
    ticket_seq: u64,
    first_python_driver_seen: bool,
    first_driver_wait: Option<FirstDriverWait>,
}

impl<L: ProcessLauncher, C: Clock> WorkerPool<L, C> {
    /// Create a pool. The first idle sweep timer is queued immediately.
    pub fn new(config: PoolConfig, node_id: NodeId, launcher: L, clock: C, capacity: Capacity) -> Self {
        let sweep = Effect::SetTimer {
            id: TimerId::IdleSweep,
            after: config.kill_idle_workers_interval,
        };
        Self {
            config,
            node_id,
            launcher,
            clock,
            capacity,
            languages: BTreeMap::new(),
            workers: HashMap::new(),
            idle: IdleSet::new(),
            jobs: JobTable::default(),
            requests: HashMap::new(),
            env_waits: HashMap::new(),
            effects: vec![sweep],
            next_token: StartupToken(0),
            next_request: 0,
            ticket_seq: 0,
            first_python_driver_seen: false,
            first_driver_wait: None,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Drain effects produced since the last call
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Feed back the completion of an effect
    pub fn handle_event(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::RuntimeEnvCreated { ticket, result } => {
                self.on_runtime_env_created(ticket, result)
            }
            PoolEvent::ExitReplied {
                worker_id,
                accepted,
            } => self.on_exit_replied(&worker_id, accepted),
            PoolEvent::TimerFired(TimerId::ProcessRegistration(token)) => {
                self.on_process_registration_timeout(token)
            }
            PoolEvent::TimerFired(TimerId::RequestRegistration(id)) => {
                self.on_request_registration_timeout(id)
            }
            PoolEvent::TimerFired(TimerId::IdleSweep) => {
                self.try_killing_idle_workers();
                self.effects.push(Effect::SetTimer {
                    id: TimerId::IdleSweep,
                    after: self.config.kill_idle_workers_interval,
                });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Acquisition
    // -------------------------------------------------------------------------

    /// Acquire a worker for `request`. `callback` runs exactly once, either
    /// now (cache hit or immediate failure) or after a process starts.
    pub fn pop_worker(&mut self, request: PopRequest, callback: PopCallback) {
        if let Some(job_id) = request.job_id {
            match self.jobs.get(job_id) {
                None => {
                    tracing::debug!(job = %job_id, "pop for unknown job");
                    callback(PopOutcome::failure(
                        PopStatus::JobConfigMissing,
                        format!("job {} has no config on this node", job_id),
                    ));
                    return;
                }
                Some(job) if job.finished => {
                    callback(PopOutcome::failure(
                        PopStatus::JobFinished,
                        format!("job {} has finished", job_id),
                    ));
                    return;
                }
                Some(_) => {}
            }
        }

        if let Some(worker_id) = self.find_idle_worker(&request) {
            self.idle.remove(&worker_id);
            tracing::debug!(worker = %worker_id, "pop served from idle cache");
            if !self.hand_over(&worker_id, &request, callback) {
                self.dispatch_or_idle(&worker_id);
            }
            return;
        }

        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.requests.insert(id, PendingPop { request, callback });
        self.start_new_worker(id);
        self.serve_pending_starts();
    }

    fn find_idle_worker(&self, request: &PopRequest) -> Option<WorkerId> {
        self.idle.find(|id| {
            self.workers
                .get(id)
                .is_some_and(|w| worker_fits(w, request))
        })
    }

    /// Offer a worker to a caller. Affinities stick only if it is accepted.
    fn hand_over(&mut self, worker_id: &WorkerId, request: &PopRequest, callback: PopCallback) -> bool {
        let Some(worker) = self.workers.get_mut(worker_id) else {
            callback(PopOutcome::failure(
                PopStatus::WorkerPendingRegistration,
                format!("worker {} disappeared", worker_id),
            ));
            return true;
        };
        worker.state = WorkerState::Busy;
        worker.idle_since = None;

        let mut lease = worker.lease();
        lease.job_id = worker.job_id.or(request.job_id);
        if lease.root_detached_actor.is_none() {
            lease.root_detached_actor = request.root_detached_actor.clone();
        }

        if !callback(PopOutcome::success(lease)) {
            tracing::debug!(worker = %worker_id, "worker declined by caller");
            return false;
        }

        if let Some(worker) = self.workers.get_mut(worker_id) {
            if worker.job_id.is_none() {
                worker.job_id = request.job_id;
            }
            if worker.root_detached_actor.is_none() {
                worker.root_detached_actor = request.root_detached_actor.clone();
            }
            if request.is_gpu.is_some() {
                worker.is_gpu = request.is_gpu;
            }
            if request.is_actor_worker.is_some() {
                worker.is_actor_worker = request.is_actor_worker;
            }
            worker.keep_alive = request.keep_alive;
        }
        true
    }

    /// Give a started, unassigned worker to the oldest compatible pending
    /// request, or park it in the idle set.
    pub(crate) fn dispatch_or_idle(&mut self, worker_id: &WorkerId) {
        loop {
            let Some(worker) = self.workers.get(worker_id) else {
                return;
            };
            let found = self.languages.get(&worker.language).and_then(|state| {
                state
                    .pending_registration
                    .iter()
                    .chain(state.pending_start.iter())
                    .copied()
                    .find(|id| {
                        self.requests
                            .get(id)
                            .is_some_and(|p| worker_fits(worker, &p.request))
                    })
            });
            let Some(request_id) = found else {
                break;
            };
            let language = worker.language;
            self.lang(language).remove_pending(request_id);
            let Some(pending) = self.requests.remove(&request_id) else {
                continue;
            };
            tracing::debug!(worker = %worker_id, request = %request_id, "worker handed to pending request");
            if self.hand_over(worker_id, &pending.request, pending.callback) {
                return;
            }
        }

        let now = self.clock.now();
        if let Some(worker) = self.workers.get_mut(worker_id) {
            worker.state = WorkerState::Idle;
            worker.idle_since = Some(now);
            self.idle.insert(worker_id.clone(), now);
        }
    }

    fn start_new_worker(&mut self, id: RequestId) {
        let Some(pending) = self.requests.get(&id) else {
            return;
        };
        let language = pending.request.language;

        if self.num_workers_starting() >= self.config.max_startup_concurrency {
            let queued = self
                .languages
                .get(&language)
                .map_or(0, |state| state.pending_start.len());
            let queue_full = self
                .config
                .max_pending_start_requests
                .is_some_and(|cap| queued >= cap);
            if !pending.request.queue_if_saturated || queue_full {
                if let Some(pending) = self.requests.remove(&id) {
                    (pending.callback)(PopOutcome::failure(
                        PopStatus::TooManyStartingWorkerProcesses,
                        "too many worker processes are starting",
                    ));
                }
                return;
            }
            tracing::debug!(request = %id, %language, "startup ceiling reached, queued as pending start");
            self.lang(language).pending_start.push_back(id);
            return;
        }

        let request = &pending.request;
        let spec = SpawnSpec {
            language,
            kind: WorkerKind::Worker,
            job_id: request.job_id,
            runtime_env: request.runtime_env().clone(),
            dynamic_options: request.dynamic_options.clone(),
            keep_alive: request.keep_alive,
            request: Some(id),
            for_first_driver: false,
        };
        self.begin_spawn(spec);
    }

    /// Reserve a startup slot, then launch directly or after the runtime env
    /// is materialized
    pub(crate) fn begin_spawn(&mut self, spec: SpawnSpec) {
        self.reserve_slot(spec.language, spec.kind);
        if spec.runtime_env.is_trivial() {
            self.launch(spec, None);
            return;
        }
        let ticket = EnvTicket(self.next_ticket());
        self.effects.push(Effect::AcquireRuntimeEnv {
            ticket,
            job_id: spec.job_id,
            runtime_env: spec.runtime_env.clone(),
        });
        self.env_waits.insert(ticket, EnvWait::Spawn(spec));
    }

    fn launch(&mut self, spec: SpawnSpec, env_context: Option<String>) {
        let token = self.next_token;
        self.next_token = token.next();

        let job_config = spec
            .job_id
            .and_then(|job| self.jobs.get(job))
            .map(|record| &record.config);
        let argv = WorkerCommand {
            template: self.config.worker_commands.get(spec.language),
            language: spec.language,
            io_kind: spec.kind.io_kind(),
            token,
            runtime_env_hash: spec.runtime_env.hash(),
            node_id: &self.node_id,
            job: job_config,
            dynamic_options: &spec.dynamic_options,
        }
        .build();

        let mut env = Vec::new();
        if let Some(job) = spec.job_id {
            env.push(("CORRAL_JOB_ID".to_string(), job.to_hex()));
        }
        if let Some(context) = env_context {
            env.push(("CORRAL_RUNTIME_ENV_CONTEXT".to_string(), context));
        }

        match self.launcher.spawn(&argv, &env) {
            Ok(handle) => {
                tracing::info!(
                    %token,
                    pid = handle.pid,
                    language = %spec.language,
                    kind = %spec.kind,
                    job = ?spec.job_id,
                    "started worker process"
                );
                let expected_workers = match spec.kind {
                    WorkerKind::Worker => self.config.workers_per_process(spec.language),
                    _ => 1,
                };
                let process = WorkerProcess {
                    handle,
                    token,
                    language: spec.language,
                    kind: spec.kind,
                    job_id: spec.job_id,
                    runtime_env: spec.runtime_env,
                    dynamic_options: spec.dynamic_options,
                    keep_alive: spec.keep_alive,
                    workers: Vec::new(),
                    expected_workers,
                    starting: true,
                    created_at: self.clock.now(),
                    for_first_driver: spec.for_first_driver,
                };
                self.lang(spec.language).processes.insert(token, process);
                let timeout = self.config.worker_register_timeout;
                self.effects.push(Effect::SetTimer {
                    id: TimerId::ProcessRegistration(token),
                    after: timeout,
                });
                if let Some(id) = spec.request.filter(|id| self.requests.contains_key(id)) {
                    self.lang(spec.language).pending_registration.push_back(id);
                    self.effects.push(Effect::SetTimer {
                        id: TimerId::RequestRegistration(id),
                        after: timeout,
                    });
                }
            }
            Err(e) => {
                tracing::warn!(language = %spec.language, error = %e, "failed to start worker process");
                self.release_slot(spec.language, spec.kind);
                if !spec.runtime_env.is_trivial() {
                    self.effects.push(Effect::ReleaseRuntimeEnv {
                        runtime_env: spec.runtime_env,
                    });
                }
                if let Some(pending) = spec.request.and_then(|id| self.requests.remove(&id)) {
                    (pending.callback)(PopOutcome::failure(PopStatus::SpawnFailed, e.to_string()));
                }
                if spec.for_first_driver {
                    self.first_driver_progress();
                }
            }
        }
    }

    fn on_runtime_env_created(&mut self, ticket: EnvTicket, result: Result<String, String>) {
        match self.env_waits.remove(&ticket) {
            None => tracing::warn!(ticket = ticket.0, "runtime env reply for unknown ticket"),
            Some(EnvWait::JobEager(job_id)) => self.on_eager_env_created(job_id, result),
            Some(EnvWait::Spawn(spec)) => {
                let io_kind = spec.kind.io_kind();
                let abandoned = spec.request.is_some_and(|id| !self.requests.contains_key(&id));
                match result {
                    Ok(_) if abandoned => {
                        tracing::debug!("request resolved while its runtime env was installing");
                        self.release_slot(spec.language, spec.kind);
                        self.effects.push(Effect::ReleaseRuntimeEnv {
                            runtime_env: spec.runtime_env,
                        });
                    }
                    Ok(context) => self.launch(spec, Some(context)),
                    Err(message) => {
                        tracing::warn!(hash = spec.runtime_env.hash(), %message, "runtime env creation failed");
                        self.release_slot(spec.language, spec.kind);
                        if let Some(pending) = spec.request.and_then(|id| self.requests.remove(&id)) {
                            (pending.callback)(PopOutcome::failure(
                                PopStatus::RuntimeEnvCreationFailed,
                                message,
                            ));
                        }
                        if spec.for_first_driver {
                            self.first_driver_progress();
                        }
                    }
                }
                self.serve_pending_starts();
                if let Some(io) = io_kind {
                    self.try_start_io_workers(io);
                }
            }
        }
    }

    /// Issue queued spawns while startup slots are free
    pub(crate) fn serve_pending_starts(&mut self) {
        while self.num_workers_starting() < self.config.max_startup_concurrency {
            let next = Language::ALL.iter().find_map(|language| {
                self.languages
                    .get_mut(language)
                    .and_then(|state| state.pending_start.pop_front())
            });
            match next {
                Some(id) => self.start_new_worker(id),
                None => break,
            }
        }
    }

    // -------------------------------------------------------------------------
    // Registration and startup
    // -------------------------------------------------------------------------

    /// Register a worker that connected with `token`
    pub fn register_worker(
        &mut self,
        worker_id: WorkerId,
        pid: u32,
        token: StartupToken,
    ) -> Result<(), PoolError> {
        if self.workers.contains_key(&worker_id) {
            return Err(PoolError::DuplicateWorker(worker_id));
        }
        let process = self
            .process_mut(token)
            .ok_or(PoolError::UnknownStartupToken(token))?;
        if process.workers.len() >= process.expected_workers {
            return Err(PoolError::TooManyWorkers {
                token,
                expected: process.expected_workers,
            });
        }
        if process.handle.pid != pid {
            tracing::debug!(%token, spawned = process.handle.pid, pid, "worker pid differs from spawned pid");
        }
        process.workers.push(worker_id.clone());

        let worker = Worker {
            id: worker_id.clone(),
            process: ProcessHandle::new(pid),
            token: Some(token),
            language: process.language,
            kind: process.kind,
            job_id: process.job_id,
            runtime_env_hash: process.runtime_env.hash(),
            dynamic_options: process.dynamic_options.clone(),
            state: WorkerState::Registered,
            port: None,
            assigned_task: None,
            root_detached_actor: None,
            is_gpu: None,
            is_actor_worker: None,
            keep_alive: process.keep_alive,
            idle_since: None,
            exit_in_flight: false,
        };
        tracing::info!(worker = %worker_id, %token, pid, language = %worker.language, "worker registered");
        self.workers.insert(worker_id, worker);
        Ok(())
    }

    /// The worker announced it is ready to accept work
    pub fn on_worker_started(&mut self, worker_id: &WorkerId, port: Option<u16>) -> Result<(), PoolError> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.clone()))?;
        if worker.kind == WorkerKind::Driver {
            return Err(PoolError::WrongKind {
                worker: worker_id.clone(),
                actual: worker.kind,
                expected: "pooled worker",
            });
        }
        if worker.is_started() {
            return Err(PoolError::AlreadyStarted(worker_id.clone()));
        }
        worker.port = port;
        worker.state = WorkerState::Busy;
        let (token, kind, language) = (worker.token, worker.kind, worker.language);

        if let Some(token) = token {
            self.finish_starting(token);
        }
        tracing::info!(worker = %worker_id, ?port, "worker started");

        match kind.io_kind() {
            Some(io) => {
                let pool = self.lang(language).io_mut(io);
                pool.started.insert(worker_id.clone());
                pool.offer(worker_id.clone());
            }
            None => self.dispatch_or_idle(worker_id),
        }
        self.serve_pending_starts();
        Ok(())
    }

    /// A worker or driver connection closed
    pub fn disconnect_worker(&mut self, worker_id: &WorkerId) -> Result<(), PoolError> {
        let worker = self
            .workers
            .remove(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.clone()))?;
        self.idle.remove(worker_id);
        tracing::info!(worker = %worker_id, kind = %worker.kind, "worker disconnected");

        if worker.kind == WorkerKind::Driver {
            if let Some(job) = worker.job_id {
                self.jobs.driver_disconnected(job);
            }
            return Ok(());
        }

        let io = worker.kind.io_kind();
        if let Some(io) = io {
            self.lang(worker.language).io_mut(io).remove(worker_id);
        }
        if let Some(token) = worker.token {
            self.detach_from_process(token, worker_id);
        }
        self.serve_pending_starts();
        if let Some(io) = io {
            self.try_start_io_workers(io);
        }
        Ok(())
    }

    /// Release the process's startup slot if it still holds one
    pub(crate) fn finish_starting(&mut self, token: StartupToken) {
        let Some(process) = self.process_mut(token) else {
            return;
        };
        if !process.starting {
            return;
        }
        process.starting = false;
        let (language, kind, first) = (process.language, process.kind, process.for_first_driver);
        self.release_slot(language, kind);
        self.effects.push(Effect::CancelTimer {
            id: TimerId::ProcessRegistration(token),
        });
        if first {
            self.first_driver_progress();
        }
    }

    pub(crate) fn detach_from_process(&mut self, token: StartupToken, worker_id: &WorkerId) {
        self.finish_starting(token);
        let Some(process) = self.process_mut(token) else {
            return;
        };
        process.workers.retain(|w| w != worker_id);
        if process.workers.is_empty() {
            self.remove_process(token);
        }
    }

    /// Drop a process from bookkeeping, releasing its runtime env reference
    pub(crate) fn remove_process(&mut self, token: StartupToken) -> Option<WorkerProcess> {
        let process = self
            .languages
            .values_mut()
            .find_map(|state| state.processes.remove(&token))?;
        if !process.runtime_env.is_trivial() {
            self.effects.push(Effect::ReleaseRuntimeEnv {
                runtime_env: process.runtime_env.clone(),
            });
        }
        tracing::debug!(%token, pid = process.handle.pid, "process untracked");
        Some(process)
    }

    fn on_process_registration_timeout(&mut self, token: StartupToken) {
        let Some(process) = self.process(token) else {
            return;
        };
        if !process.starting {
            return;
        }
        let waited = self.clock.since(process.created_at);
        tracing::warn!(
            %token,
            pid = process.handle.pid,
            waited_ms = waited.as_millis() as u64,
            "worker process did not start in time, killing it"
        );

        self.finish_starting(token);
        let Some(process) = self.remove_process(token) else {
            return;
        };
        for worker_id in &process.workers {
            self.workers.remove(worker_id);
            self.idle.remove(worker_id);
        }
        if let Err(e) = self.launcher.kill(process.handle) {
            tracing::warn!(%token, error = %e, "failed to kill timed-out process");
        }

        let oldest = self.languages.get(&process.language).and_then(|state| {
            state.pending_registration.iter().copied().find(|id| {
                self.requests
                    .get(id)
                    .is_some_and(|p| process_fits(&process, &p.request))
            })
        });
        if let Some(id) = oldest {
            self.fail_pending_registration(id);
        }

        self.serve_pending_starts();
        if let Some(io) = process.kind.io_kind() {
            self.try_start_io_workers(io);
        }
    }

    fn on_request_registration_timeout(&mut self, id: RequestId) {
        let pending = self
            .languages
            .values()
            .any(|state| state.pending_registration.contains(&id));
        if pending {
            tracing::warn!(request = %id, "no worker registered for pending request in time");
            self.fail_pending_registration(id);
        }
    }

    fn fail_pending_registration(&mut self, id: RequestId) {
        for state in self.languages.values_mut() {
            state.remove_pending(id);
        }
        if let Some(pending) = self.requests.remove(&id) {
            (pending.callback)(PopOutcome::failure(
                PopStatus::WorkerPendingRegistration,
                "timed out waiting for a worker to register",
            ));
        }
    }

    /// Start processes so that `num_needed` workers for `runtime_env` are
    /// idle or on their way, capped by the soft limit
    pub fn prestart_workers(&mut self, language: Language, runtime_env: RuntimeEnvInfo, num_needed: usize) {
        let hash = runtime_env.hash();
        let desired = num_needed.min(self.soft_limit());
        let idle = self
            .idle
            .iter()
            .filter_map(|id| self.workers.get(id))
            .filter(|w| {
                w.language == language
                    && w.kind == WorkerKind::Worker
                    && w.runtime_env_hash == hash
                    && !w.exit_in_flight
            })
            .count();
        let starting = self
            .languages
            .get(&language)
            .map_or(0, |state| state.starting_with_hash(hash))
            + self.env_spawns(language, hash);

        let mut have = idle + starting;
        while have < desired && self.num_workers_starting() < self.config.max_startup_concurrency {
            let mut spec = SpawnSpec::bare(language, WorkerKind::Worker);
            spec.runtime_env = runtime_env.clone();
            self.begin_spawn(spec);
            have += 1;
        }
        tracing::debug!(%language, hash, desired, have, "prestart");
    }

    fn env_spawns(&self, language: Language, hash: i32) -> usize {
        self.env_waits
            .values()
            .filter(|wait| match wait {
                EnvWait::Spawn(spec) => {
                    spec.language == language
                        && spec.kind == WorkerKind::Worker
                        && spec.runtime_env.hash() == hash
                }
                EnvWait::JobEager(_) => false,
            })
            .count()
    }

    /// Register a job's driver. `on_ready` runs once registration completes:
    /// immediately, except for the first Python driver when prestarting is
    /// configured, which waits for the prestarted workers.
    pub fn register_driver(
        &mut self,
        worker_id: WorkerId,
        pid: u32,
        language: Language,
        job_id: JobId,
        job_config: JobConfig,
        on_ready: DriverReady,
    ) -> Result<(), PoolError> {
        if self.workers.contains_key(&worker_id) {
            return Err(PoolError::DuplicateWorker(worker_id));
        }
        if self.jobs.get(job_id).is_none() {
            self.handle_job_started(job_id, job_config);
        }
        self.jobs.driver_registered(job_id);

        let driver = Worker {
            id: worker_id.clone(),
            process: ProcessHandle::new(pid),
            token: None,
            language,
            kind: WorkerKind::Driver,
            job_id: Some(job_id),
            runtime_env_hash: 0,
            dynamic_options: Vec::new(),
            state: WorkerState::Busy,
            port: None,
            assigned_task: None,
            root_detached_actor: None,
            is_gpu: None,
            is_actor_worker: None,
            keep_alive: None,
            idle_since: None,
            exit_in_flight: false,
        };
        self.workers.insert(worker_id.clone(), driver);
        tracing::info!(driver = %worker_id, job = %job_id, %language, "driver registered");

        if language == Language::Python && !self.first_python_driver_seen {
            self.first_python_driver_seen = true;
            let wanted = self
                .config
                .num_prestart_python_workers
                .min(self.config.max_startup_concurrency);
            if wanted > 0 {
                self.first_driver_wait = Some(FirstDriverWait {
                    remaining: wanted,
                    on_ready,
                });
                let mut spawned = 0;
                while spawned < wanted
                    && self.num_workers_starting() < self.config.max_startup_concurrency
                {
                    let mut spec = SpawnSpec::bare(Language::Python, WorkerKind::Worker);
                    spec.for_first_driver = true;
                    self.begin_spawn(spec);
                    spawned += 1;
                }
                for _ in spawned..wanted {
                    self.first_driver_progress();
                }
                return Ok(());
            }
        }

        on_ready();
        Ok(())
    }

    fn first_driver_progress(&mut self) {
        let Some(wait) = self.first_driver_wait.as_mut() else {
            return;
        };
        wait.remaining = wait.remaining.saturating_sub(1);
        if wait.remaining == 0 {
            if let Some(wait) = self.first_driver_wait.take() {
                tracing::info!("prestarted workers ready, completing first driver registration");
                (wait.on_ready)();
            }
        }
    }

    // -------------------------------------------------------------------------
    // Release
    // -------------------------------------------------------------------------

    /// Record the task a worker is running; its root detached actor sticks
    pub fn assign_task(
        &mut self,
        worker_id: &WorkerId,
        task_id: TaskId,
        root_detached_actor: Option<ActorId>,
    ) -> Result<(), PoolError> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.clone()))?;
        worker.assigned_task = Some(task_id);
        if root_detached_actor.is_some() {
            worker.root_detached_actor = root_detached_actor;
        }
        Ok(())
    }

    /// Return a worker to the pool. Pushing an idle worker is a no-op.
    pub fn push_worker(&mut self, worker_id: &WorkerId) -> Result<(), PoolError> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.clone()))?;
        match worker.kind {
            WorkerKind::Driver => Err(PoolError::WrongKind {
                worker: worker_id.clone(),
                actual: worker.kind,
                expected: "pooled worker",
            }),
            WorkerKind::SpillWorker => self.push_io_worker(worker_id, IoWorkerKind::Spill),
            WorkerKind::RestoreWorker => self.push_io_worker(worker_id, IoWorkerKind::Restore),
            WorkerKind::Worker => {
                if !worker.is_started() {
                    tracing::debug!(worker = %worker_id, "push before start announcement ignored");
                    return Ok(());
                }
                if worker.is_idle() {
                    return Ok(());
                }
                worker.assigned_task = None;
                self.dispatch_or_idle(worker_id);
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// A registered non-driver worker
    pub fn get_registered_worker(&self, worker_id: &WorkerId) -> Option<&Worker> {
        self.workers
            .get(worker_id)
            .filter(|w| w.kind != WorkerKind::Driver)
    }

    pub fn get_registered_driver(&self, worker_id: &WorkerId) -> Option<&Worker> {
        self.workers
            .get(worker_id)
            .filter(|w| w.kind == WorkerKind::Driver)
    }

    /// Idle-worker soft limit, read live from the capacity accessor
    pub fn soft_limit(&self) -> usize {
        (self.capacity)()
    }

    pub fn num_workers_starting(&self) -> usize {
        self.languages.values().map(|s| s.starting).sum()
    }

    pub fn num_pending_start_requests(&self) -> usize {
        self.languages.values().map(|s| s.pending_start.len()).sum()
    }

    pub fn num_pending_registration_requests(&self) -> usize {
        self.languages
            .values()
            .map(|s| s.pending_registration.len())
            .sum()
    }

    pub fn process_count(&self) -> usize {
        self.languages.values().map(|s| s.processes.len()).sum()
    }

    pub fn idle_worker_count(&self) -> usize {
        self.idle.len()
    }

    /// Counters of one I/O sub-pool
    pub fn io_worker_counts(&self, kind: IoWorkerKind) -> IoPoolStats {
        self.languages
            .get(&self.config.io_worker_language)
            .map(|state| state.io(kind).stats())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> PoolStats {
        let mut idle_by_runtime_env_hash = BTreeMap::new();
        for worker in self.idle.iter().filter_map(|id| self.workers.get(id)) {
            *idle_by_runtime_env_hash
                .entry(worker.runtime_env_hash)
                .or_insert(0) += 1;
        }
        PoolStats {
            num_workers_starting: self.num_workers_starting(),
            num_pending_start_requests: self.num_pending_start_requests(),
            num_pending_registration_requests: self.num_pending_registration_requests(),
            num_processes: self.process_count(),
            num_registered_workers: self
                .workers
                .values()
                .filter(|w| w.kind != WorkerKind::Driver)
                .count(),
            num_drivers: self
                .workers
                .values()
                .filter(|w| w.kind == WorkerKind::Driver)
                .count(),
            num_idle_workers: self.idle.len(),
            soft_limit: self.soft_limit(),
            idle_by_runtime_env_hash,
            spill: self.io_worker_counts(IoWorkerKind::Spill),
            restore: self.io_worker_counts(IoWorkerKind::Restore),
        }
    }

    /// Kill every tracked process and fail everything still pending
    pub fn shutdown(&mut self) {
        let pending: Vec<PendingPop> = self.requests.drain().map(|(_, p)| p).collect();
        for pending in pending {
            (pending.callback)(PopOutcome::failure(
                PopStatus::PoolShuttingDown,
                "worker pool is shutting down",
            ));
        }
        let tokens: Vec<StartupToken> = self
            .languages
            .values()
            .flat_map(|state| state.processes.keys().copied())
            .collect();
        for token in tokens {
            if let Some(process) = self.remove_process(token) {
                if let Err(e) = self.launcher.kill(process.handle) {
                    tracing::warn!(%token, error = %e, "failed to kill worker process");
                }
            }
        }
        for state in self.languages.values_mut() {
            state.pending_start.clear();
            state.pending_registration.clear();
            state.starting = 0;
            state.spill.waiting.clear();
            state.restore.waiting.clear();
        }
        self.workers.retain(|_, w| w.kind == WorkerKind::Driver);
        self.idle = IdleSet::new();
        tracing::info!("worker pool shut down");
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    pub(crate) fn lang(&mut self, language: Language) -> &mut LanguageState {
        self.languages.entry(language).or_default()
    }

    pub(crate) fn process(&self, token: StartupToken) -> Option<&WorkerProcess> {
        self.languages
            .values()
            .find_map(|state| state.processes.get(&token))
    }

    pub(crate) fn process_mut(&mut self, token: StartupToken) -> Option<&mut WorkerProcess> {
        self.languages
            .values_mut()
            .find_map(|state| state.processes.get_mut(&token))
    }

    pub(crate) fn next_ticket(&mut self) -> u64 {
        let seq = self.ticket_seq;
        self.ticket_seq += 1;
        seq
    }

    fn reserve_slot(&mut self, language: Language, kind: WorkerKind) {
        let state = self.lang(language);
        match kind.io_kind() {
            Some(io) => state.io_mut(io).starting += 1,
            None => state.starting += 1,
        }
    }

    fn release_slot(&mut self, language: Language, kind: WorkerKind) {
        let state = self.lang(language);
        match kind.io_kind() {
            Some(io) => {
                let pool = state.io_mut(io);
                pool.starting = pool.starting.saturating_sub(1);
            }
            None => state.starting = state.starting.saturating_sub(1),
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
