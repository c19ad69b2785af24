// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime environment gate adapters
//!
//! The gate materializes a runtime environment before a worker that needs it
//! is spawned. It is reference counted: every successful `get_or_create`
//! must eventually be matched by one `release`.

mod agent;
mod noop;

pub use agent::AgentRuntimeEnvGate;
pub use noop::NoOpRuntimeEnvGate;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRuntimeEnvGate, GateCall};

use async_trait::async_trait;
use corral_core::{JobId, RuntimeEnvInfo};
use thiserror::Error;

/// Errors from runtime environment operations
#[derive(Debug, Error)]
pub enum RuntimeEnvError {
    /// The environment could not be created; the message is shown to callers
    #[error("{0}")]
    CreationFailed(String),
    #[error("runtime env agent unreachable: {0}")]
    Agent(String),
}

/// Creates and releases runtime environments by reference count
#[async_trait]
pub trait RuntimeEnvGate: Clone + Send + Sync + 'static {
    /// Create the environment if needed and take a reference to it.
    ///
    /// Returns the serialized context that worker processes are started with.
    async fn get_or_create(
        &self,
        job_id: Option<JobId>,
        env: &RuntimeEnvInfo,
    ) -> Result<String, RuntimeEnvError>;

    /// Drop one reference. Never decrements below zero.
    async fn release(&self, env: &RuntimeEnvInfo) -> Result<(), RuntimeEnvError>;
}
