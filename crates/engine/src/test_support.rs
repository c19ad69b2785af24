// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness that drives a pool with fake collaborators and resolves its
//! effects synchronously

use crate::effect::{Effect, EnvTicket, PoolEvent, TimerId};
use crate::pool::WorkerPool;
use crate::request::{PopOutcome, PopRequest};
use corral_adapters::{FakeLauncher, LaunchCall};
use corral_core::{FakeClock, PoolConfig, RuntimeEnvInfo, StartupToken, WorkerId};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

pub(crate) type Outcome = Rc<RefCell<Option<PopOutcome>>>;

pub(crate) fn config() -> PoolConfig {
    PoolConfig::default()
}

pub(crate) struct Harness {
    pub pool: WorkerPool<FakeLauncher, FakeClock>,
    pub launcher: FakeLauncher,
    pub clock: FakeClock,
    pub cpus: Rc<Cell<usize>>,
    /// Outstanding gate references per serialized env
    pub env_refs: HashMap<String, i64>,
    pub env_failures: HashMap<String, String>,
    /// Acquisitions are answered only via `resolve_envs` while set
    pub hold_envs: bool,
    pub held_envs: Vec<(EnvTicket, RuntimeEnvInfo)>,
    /// Exit requests sent, in order
    pub exits: Vec<(WorkerId, bool)>,
    pub declining: HashSet<WorkerId>,
    /// Exit requests are answered immediately while set
    pub auto_exit_replies: bool,
    pub timers: HashMap<TimerId, Duration>,
    worker_seq: u32,
}

impl Harness {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_cpus(config, 8)
    }

    pub fn with_cpus(config: PoolConfig, cpus: usize) -> Self {
        let launcher = FakeLauncher::new();
        let clock = FakeClock::new();
        let cpus = Rc::new(Cell::new(cpus));
        let capacity = cpus.clone();
        let pool = WorkerPool::new(
            config,
            "node-1".into(),
            launcher.clone(),
            clock.clone(),
            Box::new(move || capacity.get()),
        );
        let mut harness = Self {
            pool,
            launcher,
            clock,
            cpus,
            env_refs: HashMap::new(),
            env_failures: HashMap::new(),
            hold_envs: false,
            held_envs: Vec::new(),
            exits: Vec::new(),
            declining: HashSet::new(),
            auto_exit_replies: true,
            timers: HashMap::new(),
            worker_seq: 0,
        };
        harness.settle();
        harness
    }

    /// Run effects until the pool is quiet
    pub fn settle(&mut self) {
        loop {
            let effects = self.pool.take_effects();
            if effects.is_empty() {
                return;
            }
            for effect in effects {
                self.apply(effect);
            }
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::AcquireRuntimeEnv {
                ticket,
                runtime_env,
                ..
            } => {
                if self.hold_envs {
                    self.held_envs.push((ticket, runtime_env));
                } else {
                    self.answer_env(ticket, &runtime_env);
                }
            }
            Effect::ReleaseRuntimeEnv { runtime_env } => {
                *self.env_refs.entry(runtime_env.serialized).or_insert(0) -= 1;
            }
            Effect::SendExit {
                worker_id, force, ..
            } => {
                self.exits.push((worker_id.clone(), force));
                if self.auto_exit_replies {
                    let accepted = force || !self.declining.contains(&worker_id);
                    self.pool.handle_event(PoolEvent::ExitReplied {
                        worker_id,
                        accepted,
                    });
                }
            }
            Effect::SetTimer { id, after } => {
                self.timers.insert(id, after);
            }
            Effect::CancelTimer { id } => {
                self.timers.remove(&id);
            }
        }
    }

    fn answer_env(&mut self, ticket: EnvTicket, env: &RuntimeEnvInfo) {
        let result = match self.env_failures.get(&env.serialized) {
            Some(message) => Err(message.clone()),
            None => {
                *self.env_refs.entry(env.serialized.clone()).or_insert(0) += 1;
                Ok(format!("ctx:{}", env.serialized))
            }
        };
        self.pool
            .handle_event(PoolEvent::RuntimeEnvCreated { ticket, result });
    }

    /// Answer every held acquisition
    pub fn resolve_envs(&mut self) {
        for (ticket, env) in std::mem::take(&mut self.held_envs) {
            self.answer_env(ticket, &env);
        }
        self.settle();
    }

    pub fn env_refs(&self, serialized: &str) -> i64 {
        self.env_refs.get(serialized).copied().unwrap_or(0)
    }

    pub fn fire(&mut self, id: TimerId) {
        self.timers.remove(&id);
        self.pool.handle_event(PoolEvent::TimerFired(id));
        self.settle();
    }

    pub fn sweep(&mut self) {
        self.fire(TimerId::IdleSweep);
    }

    /// Pop with a callback that accepts the worker
    pub fn pop(&mut self, request: PopRequest) -> Outcome {
        self.pop_with(request, true)
    }

    pub fn pop_with(&mut self, request: PopRequest, accept: bool) -> Outcome {
        let outcome: Outcome = Rc::new(RefCell::new(None));
        let sink = outcome.clone();
        self.pool.pop_worker(
            request,
            Box::new(move |result| {
                *sink.borrow_mut() = Some(result);
                accept
            }),
        );
        self.settle();
        outcome
    }

    /// Startup tokens and pids of every spawn, in order
    pub fn spawned(&self) -> Vec<(StartupToken, u32)> {
        self.launcher
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                LaunchCall::Spawn { argv, pid, .. } => {
                    let token = argv.iter().find_map(|arg| {
                        arg.split_once("startup-token=")
                            .and_then(|(_, value)| value.parse().ok())
                    })?;
                    Some((StartupToken(token), pid))
                }
                LaunchCall::Kill { .. } => None,
            })
            .collect()
    }

    pub fn token(&self, index: usize) -> StartupToken {
        self.spawned()[index].0
    }

    pub fn register(&mut self, token: StartupToken) -> WorkerId {
        let pid = self
            .spawned()
            .into_iter()
            .find(|(t, _)| *t == token)
            .map(|(_, pid)| pid)
            .unwrap();
        self.worker_seq += 1;
        let worker_id = WorkerId::from(format!("w-{}", self.worker_seq));
        self.pool
            .register_worker(worker_id.clone(), pid, token)
            .unwrap();
        self.settle();
        worker_id
    }

    pub fn announce(&mut self, worker_id: &WorkerId) {
        self.pool
            .on_worker_started(worker_id, Some(20000 + self.worker_seq as u16))
            .unwrap();
        self.settle();
    }

    /// Register and announce one worker for the `index`th spawn
    pub fn start(&mut self, index: usize) -> WorkerId {
        let token = self.token(index);
        let worker_id = self.register(token);
        self.announce(&worker_id);
        worker_id
    }

    pub fn push(&mut self, worker_id: &WorkerId) {
        self.pool.push_worker(worker_id).unwrap();
        self.settle();
    }

    pub fn advance(&mut self, by: Duration) {
        self.clock.advance(by);
    }
}

/// Worker id of a successful outcome
pub(crate) fn leased(outcome: &Outcome) -> WorkerId {
    outcome
        .borrow()
        .as_ref()
        .and_then(|o| o.worker.as_ref())
        .map(|lease| lease.worker_id.clone())
        .unwrap()
}
