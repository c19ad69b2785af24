// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time-ordered, de-duplicated set of idle workers

use corral_core::WorkerId;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

type IdleKey = (Instant, u64);

/// Idle workers ordered oldest-first
///
/// The sequence number breaks ties between workers that became idle at the
/// same instant, preserving insertion order.
#[derive(Debug, Default)]
pub struct IdleSet {
    order: BTreeMap<IdleKey, WorkerId>,
    index: HashMap<WorkerId, IdleKey>,
    seq: u64,
}

impl IdleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a worker; returns false if it was already present
    pub fn insert(&mut self, worker: WorkerId, since: Instant) -> bool {
        if self.index.contains_key(&worker) {
            return false;
        }
        self.seq += 1;
        let key = (since, self.seq);
        self.order.insert(key, worker.clone());
        self.index.insert(worker, key);
        true
    }

    pub fn remove(&mut self, worker: &WorkerId) -> bool {
        match self.index.remove(worker) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, worker: &WorkerId) -> bool {
        self.index.contains_key(worker)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Oldest-first iteration
    pub fn iter(&self) -> impl Iterator<Item = &WorkerId> {
        self.order.values()
    }

    /// First worker, oldest-first, satisfying `pred`
    pub fn find(&self, mut pred: impl FnMut(&WorkerId) -> bool) -> Option<WorkerId> {
        self.order.values().find(|w| pred(w)).cloned()
    }
}

#[cfg(test)]
#[path = "idle_tests.rs"]
mod tests;
