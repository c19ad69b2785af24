// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral worker pool engine
//!
//! [`WorkerPool`] owns every worker and process record and never blocks.
//! Work it cannot finish synchronously is queued as an [`Effect`]; the host
//! runs effects through an [`Executor`] and feeds completions back with
//! [`WorkerPool::handle_event`].

mod command;
mod effect;
mod error;
mod executor;
mod idle;
mod io_pool;
mod io_workers;
mod jobs;
mod language_state;
mod pool;
mod request;
mod scheduler;
mod sweep;
mod worker;

#[cfg(test)]
mod test_support;

pub use command::WorkerCommand;
pub use effect::{Effect, EnvTicket, PoolEvent, TimerId};
pub use error::PoolError;
pub use executor::Executor;
pub use io_pool::{IoCallback, IoPoolStats};
pub use jobs::JobRecord;
pub use pool::{Capacity, DriverReady, PoolStats, WorkerPool};
pub use request::{PopCallback, PopOutcome, PopRequest, RequestId};
pub use scheduler::Scheduler;
pub use worker::{Worker, WorkerLease, WorkerState};
