// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake exit client for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ExitClient, ExitError};
use async_trait::async_trait;
use corral_core::WorkerId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Recorded exit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCall {
    pub worker_id: WorkerId,
    pub pid: u32,
    pub force: bool,
}

#[derive(Default)]
struct FakeExitState {
    calls: Vec<ExitCall>,
    declining: HashSet<WorkerId>,
}

/// Fake exit client that accepts unless told to decline
#[derive(Clone, Default)]
pub struct FakeExitClient {
    inner: Arc<Mutex<FakeExitState>>,
}

impl FakeExitClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graceful requests to this worker will be declined
    pub fn decline(&self, worker_id: &WorkerId) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .declining
            .insert(worker_id.clone());
    }

    pub fn calls(&self) -> Vec<ExitCall> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).calls.clone()
    }
}

#[async_trait]
impl ExitClient for FakeExitClient {
    async fn exit(&self, worker_id: &WorkerId, pid: u32, force: bool) -> Result<bool, ExitError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(ExitCall {
            worker_id: worker_id.clone(),
            pid,
            force,
        });
        Ok(force || !state.declining.contains(worker_id))
    }
}
