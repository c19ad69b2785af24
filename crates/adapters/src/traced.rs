// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::exit::{ExitClient, ExitError};
use crate::launcher::{LaunchError, ProcessHandle, ProcessLauncher};
use crate::runtime_env::{RuntimeEnvError, RuntimeEnvGate};
use async_trait::async_trait;
use corral_core::{JobId, RuntimeEnvInfo, WorkerId};

/// Wrapper that adds tracing to any ProcessLauncher
#[derive(Clone)]
pub struct TracedLauncher<L> {
    inner: L,
}

impl<L> TracedLauncher<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

impl<L: ProcessLauncher> ProcessLauncher for TracedLauncher<L> {
    fn spawn(
        &self,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ProcessHandle, LaunchError> {
        let program = argv.first().map(String::as_str).unwrap_or("");
        let span = tracing::info_span!("launcher.spawn", program);
        let _guard = span.enter();

        tracing::debug!(argc = argv.len(), env_count = env.len(), "starting");

        let start = std::time::Instant::now();
        let result = self.inner.spawn(argv, env);
        let elapsed = start.elapsed();

        match &result {
            Ok(handle) => tracing::info!(
                pid = handle.pid,
                elapsed_ms = elapsed.as_millis() as u64,
                "process spawned"
            ),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "spawn failed"
            ),
        }

        result
    }

    fn kill(&self, handle: ProcessHandle) -> Result<(), LaunchError> {
        let span = tracing::info_span!("launcher.kill", pid = handle.pid);
        let _guard = span.enter();

        let result = self.inner.kill(handle);
        match &result {
            Ok(()) => tracing::info!("killed"),
            Err(e) => tracing::warn!(error = %e, "kill failed"),
        }
        result
    }
}

/// Wrapper that adds tracing to any RuntimeEnvGate
#[derive(Clone)]
pub struct TracedRuntimeEnvGate<G> {
    inner: G,
}

impl<G> TracedRuntimeEnvGate<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<G: RuntimeEnvGate> RuntimeEnvGate for TracedRuntimeEnvGate<G> {
    async fn get_or_create(
        &self,
        job_id: Option<JobId>,
        env: &RuntimeEnvInfo,
    ) -> Result<String, RuntimeEnvError> {
        let span = tracing::info_span!(
            "runtime_env.get_or_create",
            job = ?job_id,
            hash = env.hash()
        );
        let _guard = span.enter();

        tracing::info!(eager = env.config.eager_install, "acquiring");

        let start = std::time::Instant::now();
        let result = self.inner.get_or_create(job_id, env).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "acquired"),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "acquire failed"
            ),
        }

        result
    }

    async fn release(&self, env: &RuntimeEnvInfo) -> Result<(), RuntimeEnvError> {
        let span = tracing::info_span!("runtime_env.release", hash = env.hash());
        let _guard = span.enter();

        let result = self.inner.release(env).await;
        match &result {
            Ok(()) => tracing::debug!("released"),
            Err(e) => tracing::warn!(error = %e, "release failed"),
        }
        result
    }
}

/// Wrapper that adds tracing to any ExitClient
#[derive(Clone)]
pub struct TracedExitClient<E> {
    inner: E,
}

impl<E> TracedExitClient<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<E: ExitClient> ExitClient for TracedExitClient<E> {
    async fn exit(&self, worker_id: &WorkerId, pid: u32, force: bool) -> Result<bool, ExitError> {
        let span = tracing::info_span!("worker.exit", worker = %worker_id, pid, force);
        let _guard = span.enter();

        let start = std::time::Instant::now();
        let result = self.inner.exit(worker_id, pid, force).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(accepted) => tracing::info!(
                accepted,
                elapsed_ms = elapsed.as_millis() as u64,
                "exit replied"
            ),
            Err(e) => tracing::warn!(error = %e, "exit request failed"),
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
