// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idle-worker reclamation
//!
//! Workers only leave after they accept an exit request. The sweep picks
//! whole processes, oldest idle first, and never touches a process that
//! still has a busy worker or an exit in flight.

use crate::effect::Effect;
use crate::pool::WorkerPool;
use corral_adapters::ProcessLauncher;
use corral_core::{Clock, JobId, StartupToken, WorkerId};
use std::collections::HashSet;
use std::time::Duration;

impl<L: ProcessLauncher, C: Clock> WorkerPool<L, C> {
    /// Ask idle workers to exit once the pool is over its soft limit and
    /// they have been idle past their keep-alive window. Workers of
    /// finished jobs are force-killed regardless.
    pub fn try_killing_idle_workers(&mut self) {
        self.sweep(None);
    }

    pub(crate) fn kill_idle_workers_of_job(&mut self, job_id: JobId) {
        self.sweep(Some(job_id));
    }

    fn sweep(&mut self, only_job: Option<JobId>) {
        let now = self.clock.now();
        let threshold = self.config.idle_worker_killing_time_threshold;
        let in_flight = self
            .idle
            .iter()
            .filter(|id| self.workers.get(*id).is_some_and(|w| w.exit_in_flight))
            .count();
        let mut excess = (self.idle.len() - in_flight).saturating_sub(self.soft_limit());

        let mut touched: HashSet<StartupToken> = HashSet::new();
        let mut chosen: Vec<(WorkerId, bool)> = Vec::new();
        for id in self.idle.iter() {
            let Some(worker) = self.workers.get(id) else {
                continue;
            };
            if worker.exit_in_flight || only_job.is_some_and(|job| worker.job_id != Some(job)) {
                continue;
            }
            let Some(token) = worker.token else {
                continue;
            };
            if touched.contains(&token) {
                continue;
            }

            let force = worker.job_id.is_some_and(|job| self.jobs.is_finished(job));
            if !force {
                if excess == 0 {
                    continue;
                }
                let window = worker.keep_alive.unwrap_or(threshold);
                let idle_for = worker
                    .idle_since
                    .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
                if idle_for < window {
                    continue;
                }
            }

            let Some(process) = self.process(token) else {
                continue;
            };
            touched.insert(token);
            let whole_process_idle = process.workers.iter().all(|member| {
                self.workers
                    .get(member)
                    .is_some_and(|w| w.is_idle() && !w.exit_in_flight)
            });
            if !whole_process_idle {
                continue;
            }
            for member in &process.workers {
                chosen.push((member.clone(), force));
                excess = excess.saturating_sub(1);
            }
        }

        for (worker_id, force) in chosen {
            let Some(worker) = self.workers.get_mut(&worker_id) else {
                continue;
            };
            worker.exit_in_flight = true;
            tracing::debug!(worker = %worker_id, force, "requesting idle worker exit");
            self.effects.push(Effect::SendExit {
                worker_id,
                pid: worker.process.pid,
                force,
            });
        }
    }

    /// A worker answered an exit request. Declining moves it to the back of
    /// the idle order so the next sweep tries the next-oldest worker.
    pub(crate) fn on_exit_replied(&mut self, worker_id: &WorkerId, accepted: bool) {
        let now = self.clock.now();
        let Some(worker) = self.workers.get_mut(worker_id) else {
            tracing::debug!(worker = %worker_id, "exit reply for unknown worker");
            return;
        };
        worker.exit_in_flight = false;
        if !accepted {
            tracing::debug!(worker = %worker_id, "worker declined exit");
            if self.idle.remove(worker_id) {
                worker.idle_since = Some(now);
                self.idle.insert(worker_id.clone(), now);
            }
            return;
        }

        let token = worker.token;
        self.workers.remove(worker_id);
        self.idle.remove(worker_id);
        tracing::info!(worker = %worker_id, "idle worker exited");
        if let Some(token) = token {
            self.detach_from_process(token, worker_id);
        }
    }
}
