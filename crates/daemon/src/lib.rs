// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! corral-daemon: the node-local worker pool service

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use lifecycle::{Config, DaemonState, LifecycleError};
pub use protocol::{IoPoolKind, PopSpec, ProtocolError, Request, Response};
