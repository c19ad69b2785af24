// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime environment descriptors
//!
//! A runtime environment is an opaque serialized sandbox description. The
//! pool only cares about two things: whether it is trivial (no gate round
//! trip needed) and its fingerprint hash, which partitions workers so that
//! a worker prepared for one environment is never handed to another.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Installation options attached to a runtime environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEnvConfig {
    /// Install when the job starts rather than on first worker spawn
    #[serde(default)]
    pub eager_install: bool,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub setup_timeout: Option<Duration>,
}

/// A serialized runtime environment plus its install options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEnvInfo {
    pub serialized: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
    #[serde(default)]
    pub config: RuntimeEnvConfig,
}

impl RuntimeEnvInfo {
    pub fn new(serialized: impl Into<String>) -> Self {
        Self {
            serialized: serialized.into(),
            ..Self::default()
        }
    }

    /// Same environment, installed eagerly at job start
    pub fn eager(serialized: impl Into<String>) -> Self {
        let mut info = Self::new(serialized);
        info.config.eager_install = true;
        info
    }

    /// True when no sandbox needs to be materialized
    pub fn is_trivial(&self) -> bool {
        is_trivial(&self.serialized)
    }

    pub fn hash(&self) -> i32 {
        runtime_env_hash(&self.serialized)
    }
}

fn is_trivial(serialized: &str) -> bool {
    let trimmed = serialized.trim();
    trimmed.is_empty() || trimmed == "{}"
}

/// Fingerprint of a serialized runtime environment
///
/// Trivial environments hash to 0 so that workers started without an
/// environment and workers started with `{}` share one cache partition.
pub fn runtime_env_hash(serialized: &str) -> i32 {
    if is_trivial(serialized) {
        return 0;
    }
    crc32fast::hash(serialized.as_bytes()) as i32
}

#[cfg(test)]
#[path = "runtime_env_tests.rs"]
mod tests;
