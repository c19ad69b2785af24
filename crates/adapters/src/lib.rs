// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the worker pool's external collaborators

pub mod exit;
pub mod launcher;
pub mod runtime_env;
pub mod traced;

pub use exit::{ExitClient, ExitError, SignalExitClient};
pub use launcher::{CommandLauncher, LaunchError, ProcessHandle, ProcessLauncher};
pub use runtime_env::{
    AgentRuntimeEnvGate, NoOpRuntimeEnvGate, RuntimeEnvError, RuntimeEnvGate,
};
pub use traced::{TracedExitClient, TracedLauncher, TracedRuntimeEnvGate};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use exit::{ExitCall, FakeExitClient};
#[cfg(any(test, feature = "test-support"))]
pub use launcher::{FakeLauncher, LaunchCall};
#[cfg(any(test, feature = "test-support"))]
pub use runtime_env::{FakeRuntimeEnvGate, GateCall};
