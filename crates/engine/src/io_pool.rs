// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity sub-pool of I/O helper workers

use corral_core::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Receives an I/O worker once one is available
pub type IoCallback = Box<dyn FnOnce(WorkerId)>;

#[derive(Default)]
pub(crate) struct IoPool {
    /// Processes spawned but not yet announced
    pub starting: usize,
    /// Announced workers, idle or busy
    pub started: HashSet<WorkerId>,
    pub idle: VecDeque<WorkerId>,
    pub waiting: VecDeque<IoCallback>,
}

impl IoPool {
    /// Workers to spawn so that waiting callbacks are covered without
    /// exceeding `capacity`
    pub fn spawn_budget(&self, capacity: usize) -> usize {
        let available = capacity.saturating_sub(self.starting + self.started.len());
        let needed = self.waiting.len().saturating_sub(self.starting);
        available.min(needed)
    }

    /// Hand `worker` to the oldest waiting callback or park it as idle
    pub fn offer(&mut self, worker: WorkerId) {
        match self.waiting.pop_front() {
            Some(callback) => callback(worker),
            None => {
                if !self.idle.contains(&worker) {
                    self.idle.push_back(worker);
                }
            }
        }
    }

    pub fn remove(&mut self, worker: &WorkerId) -> bool {
        self.idle.retain(|w| w != worker);
        self.started.remove(worker)
    }

    pub fn stats(&self) -> IoPoolStats {
        IoPoolStats {
            starting: self.starting,
            started: self.started.len(),
            idle: self.idle.len(),
            waiting: self.waiting.len(),
        }
    }
}

/// Counters of one I/O sub-pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoPoolStats {
    pub starting: usize,
    pub started: usize,
    pub idle: usize,
    pub waiting: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn budget_covers_waiting_callbacks_within_capacity() {
        let mut pool = IoPool::default();
        for _ in 0..3 {
            pool.waiting.push_back(Box::new(|_| {}));
        }
        assert_eq!(pool.spawn_budget(2), 2);

        pool.starting = 2;
        assert_eq!(pool.spawn_budget(2), 0);
        assert_eq!(pool.spawn_budget(4), 1);
    }

    #[test]
    fn offer_prefers_waiting_callback_and_dedups_idle() {
        let mut pool = IoPool::default();
        let got = Rc::new(RefCell::new(None));
        let sink = got.clone();
        pool.waiting
            .push_back(Box::new(move |w| *sink.borrow_mut() = Some(w)));

        pool.offer(WorkerId::from("io-1"));
        assert_eq!(got.borrow().clone(), Some(WorkerId::from("io-1")));
        assert!(pool.idle.is_empty());

        pool.offer(WorkerId::from("io-2"));
        pool.offer(WorkerId::from("io-2"));
        assert_eq!(pool.idle.len(), 1);
    }
}
