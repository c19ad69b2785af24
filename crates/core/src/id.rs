// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier of a worker or driver, chosen by the worker itself
    WorkerId
);
string_id!(
    /// Identifier of an actor
    ActorId
);
string_id!(
    /// Identifier of a task
    TaskId
);
string_id!(
    /// Identifier of the node this pool runs on
    NodeId
);

/// Identifier of a job
///
/// Workers that have not been bound to a job carry `Option::<JobId>::None`
/// rather than a nil sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u32);

impl JobId {
    /// Hex form passed to worker processes
    pub fn to_hex(self) -> String {
        format!("{:08x}", self.0)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<u32> for JobId {
    fn from(n: u32) -> Self {
        JobId(n)
    }
}

/// Correlates a process spawn with the registration of its workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartupToken(pub u64);

impl StartupToken {
    pub fn next(self) -> Self {
        StartupToken(self.0 + 1)
    }
}

impl std::fmt::Display for StartupToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
