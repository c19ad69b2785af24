// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spill, restore and delete worker operations
//!
//! I/O workers run in the configured I/O language, are capped by
//! `max_io_workers` per kind, and do not count against the startup ceiling
//! or the idle soft limit.

use crate::error::PoolError;
use crate::io_pool::IoCallback;
use crate::language_state::SpawnSpec;
use crate::pool::WorkerPool;
use corral_adapters::ProcessLauncher;
use corral_core::{Clock, IoWorkerKind, WorkerId, WorkerKind};

impl<L: ProcessLauncher, C: Clock> WorkerPool<L, C> {
    pub fn pop_spill_worker(&mut self, callback: IoCallback) {
        self.pop_io_worker(IoWorkerKind::Spill, callback);
    }

    pub fn pop_restore_worker(&mut self, callback: IoCallback) {
        self.pop_io_worker(IoWorkerKind::Restore, callback);
    }

    /// Borrow whichever I/O pool has more idle workers; spill on a tie
    pub fn pop_delete_worker(&mut self, callback: IoCallback) {
        let language = self.config.io_worker_language;
        let state = self.lang(language);
        let kind = if state.restore.idle.len() > state.spill.idle.len() {
            IoWorkerKind::Restore
        } else {
            IoWorkerKind::Spill
        };
        self.pop_io_worker(kind, callback);
    }

    pub fn push_spill_worker(&mut self, worker_id: &WorkerId) -> Result<(), PoolError> {
        self.push_io_worker(worker_id, IoWorkerKind::Spill)
    }

    pub fn push_restore_worker(&mut self, worker_id: &WorkerId) -> Result<(), PoolError> {
        self.push_io_worker(worker_id, IoWorkerKind::Restore)
    }

    /// Return a worker borrowed for deletion to the pool it came from
    pub fn push_delete_worker(&mut self, worker_id: &WorkerId) -> Result<(), PoolError> {
        let worker = self
            .workers
            .get(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.clone()))?;
        let kind = worker.kind.io_kind().ok_or_else(|| PoolError::WrongKind {
            worker: worker_id.clone(),
            actual: worker.kind,
            expected: "I/O worker",
        })?;
        self.push_io_worker(worker_id, kind)
    }

    fn pop_io_worker(&mut self, kind: IoWorkerKind, callback: IoCallback) {
        let language = self.config.io_worker_language;
        let pool = self.lang(language).io_mut(kind);
        if let Some(worker) = pool.idle.pop_front() {
            callback(worker);
            return;
        }
        pool.waiting.push_back(callback);
        tracing::debug!(%kind, waiting = pool.waiting.len(), "no idle I/O worker");
        self.try_start_io_workers(kind);
    }

    pub(crate) fn push_io_worker(&mut self, worker_id: &WorkerId, kind: IoWorkerKind) -> Result<(), PoolError> {
        let worker = self
            .workers
            .get(worker_id)
            .ok_or_else(|| PoolError::UnknownWorker(worker_id.clone()))?;
        if worker.kind != WorkerKind::from(kind) {
            return Err(PoolError::WrongKind {
                worker: worker_id.clone(),
                actual: worker.kind,
                expected: WorkerKind::from(kind).as_str(),
            });
        }
        let language = worker.language;
        let pool = self.lang(language).io_mut(kind);
        if !pool.started.contains(worker_id) {
            tracing::debug!(worker = %worker_id, "push before start announcement ignored");
            return Ok(());
        }
        pool.offer(worker_id.clone());
        Ok(())
    }

    /// Spawn I/O workers for waiting callbacks, up to `max_io_workers`
    pub(crate) fn try_start_io_workers(&mut self, kind: IoWorkerKind) {
        let language = self.config.io_worker_language;
        let capacity = self.config.max_io_workers;
        let budget = self.lang(language).io(kind).spawn_budget(capacity);
        for _ in 0..budget {
            self.begin_spawn(SpawnSpec::bare(language, kind.into()));
        }
    }
}
