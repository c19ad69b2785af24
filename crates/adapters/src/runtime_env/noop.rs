// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op gate for nodes without a runtime env agent.

use super::{RuntimeEnvError, RuntimeEnvGate};
use async_trait::async_trait;
use corral_core::{JobId, RuntimeEnvInfo};

/// Gate that accepts every environment without installing anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpRuntimeEnvGate;

impl NoOpRuntimeEnvGate {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RuntimeEnvGate for NoOpRuntimeEnvGate {
    async fn get_or_create(
        &self,
        _job_id: Option<JobId>,
        _env: &RuntimeEnvInfo,
    ) -> Result<String, RuntimeEnvError> {
        Ok("{}".to_string())
    }

    async fn release(&self, _env: &RuntimeEnvInfo) -> Result<(), RuntimeEnvError> {
        Ok(())
    }
}
