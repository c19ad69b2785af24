// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for pool operations

use corral_core::{StartupToken, WorkerId, WorkerKind};
use thiserror::Error;

/// Errors returned to the connection layer; none are fatal to the pool
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("unknown startup token {0}")]
    UnknownStartupToken(StartupToken),
    #[error("unknown worker {0}")]
    UnknownWorker(WorkerId),
    #[error("worker {0} is already registered")]
    DuplicateWorker(WorkerId),
    #[error("process with token {token} already hosts {expected} worker(s)")]
    TooManyWorkers { token: StartupToken, expected: usize },
    #[error("worker {worker} is a {actual}, expected {expected}")]
    WrongKind {
        worker: WorkerId,
        actual: WorkerKind,
        expected: &'static str,
    },
    #[error("worker {0} has already announced it started")]
    AlreadyStarted(WorkerId),
}
