// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid configuration.
//!
//! ```toml
//! max_startup_concurrency = 8
//! worker_register_timeout = "30s"
//!
//! [worker_commands]
//! python = ["python3", "-m", "corral_worker"]
//! ```

use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Marks where assembled options are spliced into a worker command template
pub const DYNAMIC_OPTION_PLACEHOLDER: &str = "CORRAL_WORKER_DYNAMIC_OPTION_PLACEHOLDER";

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Command templates, one argv per language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerCommands {
    pub python: Vec<String>,
    pub java: Vec<String>,
    pub cpp: Vec<String>,
}

impl WorkerCommands {
    pub fn get(&self, language: Language) -> &[String] {
        match language {
            Language::Python => &self.python,
            Language::Java => &self.java,
            Language::Cpp => &self.cpp,
        }
    }

    pub fn set(&mut self, language: Language, argv: Vec<String>) {
        match language {
            Language::Python => self.python = argv,
            Language::Java => self.java = argv,
            Language::Cpp => self.cpp = argv,
        }
    }
}

impl Default for WorkerCommands {
    fn default() -> Self {
        let argv = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect();
        Self {
            python: argv(&["python3", "-u", "-m", "corral_worker"]),
            java: argv(&["java", DYNAMIC_OPTION_PLACEHOLDER, "io.corral.runtime.WorkerMain"]),
            cpp: argv(&["corral_cpp_worker"]),
        }
    }
}

/// Tunables for one worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Ceiling on worker processes starting at once, shared by all languages
    pub max_startup_concurrency: usize,
    /// Capacity of each I/O sub-pool, counting starting and started workers
    pub max_io_workers: usize,
    #[serde(with = "humantime_serde")]
    pub worker_register_timeout: Duration,
    /// Default keep-alive window before an idle worker may be evicted
    #[serde(with = "humantime_serde")]
    pub idle_worker_killing_time_threshold: Duration,
    #[serde(with = "humantime_serde")]
    pub kill_idle_workers_interval: Duration,
    /// Workers prestarted for the first Python driver; its registration
    /// completes once they have started. Zero disables the wait.
    pub num_prestart_python_workers: usize,
    /// Logical workers hosted by each Java worker process
    pub num_workers_per_process_java: usize,
    /// Cap on queued pending-start requests per language; unbounded if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending_start_requests: Option<usize>,
    /// Overrides detected CPU count for the idle soft limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_cpus: Option<usize>,
    pub io_worker_language: Language,
    pub worker_commands: WorkerCommands,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_startup_concurrency: 4,
            max_io_workers: 4,
            worker_register_timeout: Duration::from_secs(60),
            idle_worker_killing_time_threshold: Duration::from_secs(1),
            kill_idle_workers_interval: Duration::from_millis(200),
            num_prestart_python_workers: 0,
            num_workers_per_process_java: 1,
            max_pending_start_requests: None,
            available_cpus: None,
            io_worker_language: Language::Python,
            worker_commands: WorkerCommands::default(),
        }
    }
}

impl PoolConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded pool config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_startup_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_startup_concurrency must be at least 1".to_string(),
            ));
        }
        if self.num_workers_per_process_java == 0 {
            return Err(ConfigError::Invalid(
                "num_workers_per_process_java must be at least 1".to_string(),
            ));
        }
        if self.kill_idle_workers_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "kill_idle_workers_interval must be non-zero".to_string(),
            ));
        }
        for language in Language::ALL {
            let argv = self.worker_commands.get(language);
            let has_executable = argv
                .iter()
                .any(|arg| !arg.is_empty() && arg != DYNAMIC_OPTION_PLACEHOLDER);
            if !has_executable {
                return Err(ConfigError::Invalid(format!(
                    "worker command for {} has no executable",
                    language
                )));
            }
        }
        Ok(())
    }

    /// Logical workers each spawned process of `language` hosts
    pub fn workers_per_process(&self, language: Language) -> usize {
        match language {
            Language::Java => self.num_workers_per_process_java,
            Language::Python | Language::Cpp => 1,
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// One-line summary for startup logs
    pub fn summary(&self) -> String {
        format!(
            "startup_concurrency={} io_workers={} register_timeout={} idle_threshold={} sweep_every={}",
            self.max_startup_concurrency,
            self.max_io_workers,
            humantime::format_duration(self.worker_register_timeout),
            humantime::format_duration(self.idle_worker_killing_time_threshold),
            humantime::format_duration(self.kill_idle_workers_interval),
        )
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
