// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Language runtimes and worker kinds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language runtime a worker process executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::Java, Language::Cpp];

    /// Value of the trailing `--language=` marker on worker command lines
    pub fn marker(self) -> &'static str {
        match self {
            Language::Python => "PYTHON",
            Language::Java => "JAVA",
            Language::Cpp => "CPP",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

/// What a worker is used for
///
/// Drivers are job entry points that register themselves; they are never
/// pooled. Spill and restore workers serve the I/O sub-pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Worker,
    Driver,
    SpillWorker,
    RestoreWorker,
}

impl WorkerKind {
    /// The I/O sub-pool this kind belongs to, if any
    pub fn io_kind(self) -> Option<IoWorkerKind> {
        match self {
            WorkerKind::SpillWorker => Some(IoWorkerKind::Spill),
            WorkerKind::RestoreWorker => Some(IoWorkerKind::Restore),
            WorkerKind::Worker | WorkerKind::Driver => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Worker => "worker",
            WorkerKind::Driver => "driver",
            WorkerKind::SpillWorker => "spill_worker",
            WorkerKind::RestoreWorker => "restore_worker",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of I/O helper worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoWorkerKind {
    Spill,
    Restore,
}

impl IoWorkerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IoWorkerKind::Spill => "spill",
            IoWorkerKind::Restore => "restore",
        }
    }
}

impl From<IoWorkerKind> for WorkerKind {
    fn from(kind: IoWorkerKind) -> Self {
        match kind {
            IoWorkerKind::Spill => WorkerKind::SpillWorker,
            IoWorkerKind::Restore => WorkerKind::RestoreWorker,
        }
    }
}

impl fmt::Display for IoWorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "language_tests.rs"]
mod tests;
