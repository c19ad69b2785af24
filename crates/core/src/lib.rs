// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-core: shared vocabulary for the corral worker pool
//!
//! This crate provides:
//! - Identifiers for workers, jobs, actors, tasks and startup tokens
//! - Language and worker-kind tags
//! - Runtime environment descriptors and their fingerprint hash
//! - The pop status taxonomy reported to acquisition callbacks
//! - Pool configuration loaded from TOML
//! - A clock seam for deterministic tests

pub mod clock;
pub mod config;
pub mod id;
pub mod job;
pub mod language;
pub mod runtime_env;
pub mod status;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, PoolConfig, DYNAMIC_OPTION_PLACEHOLDER};
pub use id::{ActorId, JobId, NodeId, StartupToken, TaskId, WorkerId};
pub use job::JobConfig;
pub use language::{IoWorkerKind, Language, WorkerKind};
pub use runtime_env::{runtime_env_hash, RuntimeEnvConfig, RuntimeEnvInfo};
pub use status::PopStatus;
