// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job configuration delivered with job-start notifications

use crate::runtime_env::RuntimeEnvInfo;
use serde::{Deserialize, Serialize};

/// Job-scoped settings that shape how workers for the job are started
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_env: Option<RuntimeEnvInfo>,
    /// Directories searched for user code, joined with `:` on the command line
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_search_path: Vec<String>,
    /// Extra JVM options for Java workers of this job
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jvm_options: Vec<String>,
}

impl JobConfig {
    /// The runtime environment to install at job start, if any
    pub fn eager_runtime_env(&self) -> Option<&RuntimeEnvInfo> {
        self.runtime_env
            .as_ref()
            .filter(|env| env.config.eager_install && !env.is_trivial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eager_env_requires_flag_and_content() {
        let mut config = JobConfig::default();
        assert!(config.eager_runtime_env().is_none());

        config.runtime_env = Some(RuntimeEnvInfo::new(r#"{"pip": ["x"]}"#));
        assert!(config.eager_runtime_env().is_none());

        config.runtime_env = Some(RuntimeEnvInfo::eager("{}"));
        assert!(config.eager_runtime_env().is_none());

        config.runtime_env = Some(RuntimeEnvInfo::eager(r#"{"pip": ["x"]}"#));
        assert!(config.eager_runtime_env().is_some());
    }

    #[test]
    fn empty_config_deserializes_from_empty_object() {
        let config: JobConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, JobConfig::default());
    }
}
