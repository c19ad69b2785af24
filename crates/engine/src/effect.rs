// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects the pool asks its host to perform, and the events that report
//! their completion

use crate::request::RequestId;
use corral_core::{JobId, RuntimeEnvInfo, StartupToken, WorkerId};
use std::time::Duration;

/// Correlates a runtime env acquisition with its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvTicket(pub u64);

/// Identifies a pool timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// A spawned process must have announced a worker by now
    ProcessRegistration(StartupToken),
    /// A pop request waiting on registration gives up
    RequestRegistration(RequestId),
    /// Periodic idle-kill sweep
    IdleSweep,
}

/// Work the pool cannot do synchronously
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AcquireRuntimeEnv {
        ticket: EnvTicket,
        job_id: Option<JobId>,
        runtime_env: RuntimeEnvInfo,
    },
    ReleaseRuntimeEnv {
        runtime_env: RuntimeEnvInfo,
    },
    SendExit {
        worker_id: WorkerId,
        pid: u32,
        force: bool,
    },
    SetTimer {
        id: TimerId,
        after: Duration,
    },
    CancelTimer {
        id: TimerId,
    },
}

impl Effect {
    /// Short name for log spans
    pub fn name(&self) -> &'static str {
        match self {
            Effect::AcquireRuntimeEnv { .. } => "acquire_runtime_env",
            Effect::ReleaseRuntimeEnv { .. } => "release_runtime_env",
            Effect::SendExit { .. } => "send_exit",
            Effect::SetTimer { .. } => "set_timer",
            Effect::CancelTimer { .. } => "cancel_timer",
        }
    }
}

/// Completion of an asynchronous effect, fed back into the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// `Ok` carries the serialized context, `Err` the gate's message
    RuntimeEnvCreated {
        ticket: EnvTicket,
        result: Result<String, String>,
    },
    ExitReplied {
        worker_id: WorkerId,
        accepted: bool,
    },
    TimerFired(TimerId),
}
