// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker exit request adapters

mod signal;

pub use signal::SignalExitClient;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ExitCall, FakeExitClient};

use async_trait::async_trait;
use corral_core::WorkerId;
use thiserror::Error;

/// Errors from delivering an exit request
#[derive(Debug, Error)]
pub enum ExitError {
    #[error("exit request to {worker_id} failed: {message}")]
    Delivery { worker_id: WorkerId, message: String },
}

/// Asks a worker process to exit
#[async_trait]
pub trait ExitClient: Clone + Send + Sync + 'static {
    /// Returns whether the worker accepted the request. A graceful request
    /// may be declined, for example while the worker still owns objects.
    async fn exit(&self, worker_id: &WorkerId, pid: u32, force: bool) -> Result<bool, ExitError>;
}
