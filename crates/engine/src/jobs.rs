// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle hooks

use crate::effect::{Effect, EnvTicket};
use crate::pool::{EnvWait, WorkerPool};
use crate::request::RequestId;
use corral_adapters::ProcessLauncher;
use corral_core::{Clock, JobConfig, JobId, PopStatus};
use std::collections::HashMap;

/// What the pool knows about a job
#[derive(Debug, Clone, Default)]
pub struct JobRecord {
    pub config: JobConfig,
    pub finished: bool,
    /// Connected drivers
    pub drivers: usize,
    /// An eager runtime env acquisition was issued
    pub eager_requested: bool,
    /// The pool holds the job's eager runtime env reference
    pub eager_acquired: bool,
}

#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: HashMap<JobId, JobRecord>,
}

impl JobTable {
    pub fn get(&self, job_id: JobId) -> Option<&JobRecord> {
        self.jobs.get(&job_id)
    }

    pub fn get_mut(&mut self, job_id: JobId) -> Option<&mut JobRecord> {
        self.jobs.get_mut(&job_id)
    }

    pub fn is_finished(&self, job_id: JobId) -> bool {
        self.jobs.get(&job_id).is_some_and(|job| job.finished)
    }

    pub fn driver_registered(&mut self, job_id: JobId) {
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.drivers += 1;
        }
    }

    pub fn driver_disconnected(&mut self, job_id: JobId) {
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.drivers = job.drivers.saturating_sub(1);
        }
    }

    fn upsert(&mut self, job_id: JobId, config: JobConfig) -> &mut JobRecord {
        let job = self.jobs.entry(job_id).or_default();
        job.config = config;
        job
    }
}

impl<L: ProcessLauncher, C: Clock> WorkerPool<L, C> {
    /// Record a job's config; pops for it can succeed from now on
    pub fn handle_job_started(&mut self, job_id: JobId, config: JobConfig) {
        let eager = config.eager_runtime_env().cloned();
        let job = self.jobs.upsert(job_id, config);
        let Some(runtime_env) = eager else {
            tracing::info!(job = %job_id, "job started");
            return;
        };
        if job.eager_requested {
            return;
        }
        job.eager_requested = true;
        tracing::info!(job = %job_id, hash = runtime_env.hash(), "job started, installing runtime env eagerly");

        let ticket = EnvTicket(self.next_ticket());
        self.effects.push(Effect::AcquireRuntimeEnv {
            ticket,
            job_id: Some(job_id),
            runtime_env,
        });
        self.env_waits.insert(ticket, EnvWait::JobEager(job_id));
    }

    pub(crate) fn on_eager_env_created(&mut self, job_id: JobId, result: Result<String, String>) {
        if let Err(message) = result {
            tracing::warn!(job = %job_id, %message, "eager runtime env install failed");
            return;
        }
        let finished = self.jobs.is_finished(job_id);
        match self.jobs.get_mut(job_id) {
            Some(job) if !finished => job.eager_acquired = true,
            Some(job) => {
                if let Some(runtime_env) = job.config.eager_runtime_env().cloned() {
                    tracing::debug!(job = %job_id, "job finished during eager install, releasing");
                    self.effects.push(Effect::ReleaseRuntimeEnv { runtime_env });
                }
            }
            None => {}
        }
    }

    /// Mark a job finished: its pending requests fail, its eager env is
    /// released, and its idle workers are force-killed
    pub fn handle_job_finished(&mut self, job_id: JobId) {
        let Some(job) = self.jobs.get_mut(job_id) else {
            tracing::debug!(job = %job_id, "finish for unknown job");
            return;
        };
        if job.finished {
            return;
        }
        job.finished = true;
        tracing::info!(job = %job_id, "job finished");

        if std::mem::take(&mut job.eager_acquired) {
            if let Some(runtime_env) = job.config.eager_runtime_env().cloned() {
                self.effects.push(Effect::ReleaseRuntimeEnv { runtime_env });
            }
        }

        let doomed: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, p)| p.request.job_id == Some(job_id))
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            for state in self.languages.values_mut() {
                state.remove_pending(id);
            }
            if let Some(pending) = self.requests.remove(&id) {
                (pending.callback)(crate::request::PopOutcome::failure(
                    PopStatus::JobFinished,
                    format!("job {} has finished", job_id),
                ));
            }
        }

        self.kill_idle_workers_of_job(job_id);
    }
}
