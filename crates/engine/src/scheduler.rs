// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer scheduler driven by the host's event loop

use crate::effect::TimerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Deadlines for pool timers; setting an existing timer replaces it
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerId, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timer(&mut self, id: TimerId, after: Duration, now: Instant) {
        self.timers.insert(id, now + after);
    }

    pub fn cancel_timer(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    /// Remove and return timers due at `now`, earliest first
    pub fn fired_timers(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.timers.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
