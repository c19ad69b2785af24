// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake runtime env gate for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{RuntimeEnvError, RuntimeEnvGate};
use async_trait::async_trait;
use corral_core::{JobId, RuntimeEnvInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Recorded gate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateCall {
    GetOrCreate {
        job_id: Option<JobId>,
        serialized: String,
    },
    Release {
        serialized: String,
    },
}

#[derive(Default)]
struct FakeGateState {
    calls: Vec<GateCall>,
    refs: HashMap<String, usize>,
    failures: HashMap<String, String>,
}

/// Reference-counting fake gate
///
/// Environments registered with [`FakeRuntimeEnvGate::fail_for`] fail
/// creation with the given message and take no reference.
#[derive(Clone, Default)]
pub struct FakeRuntimeEnvGate {
    inner: Arc<Mutex<FakeGateState>>,
}

impl FakeRuntimeEnvGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, serialized: &str, message: &str) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .failures
            .insert(serialized.to_string(), message.to_string());
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<GateCall> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).calls.clone()
    }

    /// Current reference count for an environment
    pub fn ref_count(&self, serialized: &str) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .refs
            .get(serialized)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl RuntimeEnvGate for FakeRuntimeEnvGate {
    async fn get_or_create(
        &self,
        job_id: Option<JobId>,
        env: &RuntimeEnvInfo,
    ) -> Result<String, RuntimeEnvError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(GateCall::GetOrCreate {
            job_id,
            serialized: env.serialized.clone(),
        });
        if let Some(message) = state.failures.get(&env.serialized) {
            return Err(RuntimeEnvError::CreationFailed(message.clone()));
        }
        *state.refs.entry(env.serialized.clone()).or_insert(0) += 1;
        Ok(format!(r#"{{"env": {}}}"#, serde_json::json!(env.serialized)))
    }

    async fn release(&self, env: &RuntimeEnvInfo) -> Result<(), RuntimeEnvError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(GateCall::Release {
            serialized: env.serialized.clone(),
        });
        if let Some(count) = state.refs.get_mut(&env.serialized) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }
}
