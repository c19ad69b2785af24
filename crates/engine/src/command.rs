// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker command-line assembly
//!
//! Option order is a compatibility contract with worker bootstrap code:
//! language per-job options, user per-job options, pool per-process
//! options, user dynamic options, then the entry point and a trailing
//! `--language=` marker.

use corral_core::{
    IoWorkerKind, JobConfig, Language, NodeId, StartupToken, DYNAMIC_OPTION_PLACEHOLDER,
};

/// Inputs for one worker process command line
pub struct WorkerCommand<'a> {
    pub template: &'a [String],
    pub language: Language,
    pub io_kind: Option<IoWorkerKind>,
    pub token: StartupToken,
    pub runtime_env_hash: i32,
    pub node_id: &'a NodeId,
    pub job: Option<&'a JobConfig>,
    pub dynamic_options: &'a [String],
}

impl WorkerCommand<'_> {
    /// Spell an option the way the language's bootstrap expects
    fn option(&self, name: &str, value: impl std::fmt::Display) -> String {
        match self.language {
            Language::Java => format!("-Dcorral.{}={}", name, value),
            Language::Python | Language::Cpp => format!("--{}={}", name, value),
        }
    }

    fn options(&self) -> Vec<String> {
        let mut options = Vec::new();

        if let Some(job) = self.job {
            if !job.code_search_path.is_empty() {
                let name = match self.language {
                    Language::Java => "job.code-search-path",
                    Language::Python | Language::Cpp => "code-search-path",
                };
                options.push(self.option(name, job.code_search_path.join(":")));
            }
            if self.language == Language::Java {
                options.extend(job.jvm_options.iter().cloned());
            }
        }

        options.push(self.option("startup-token", self.token));
        options.push(self.option("runtime-env-hash", self.runtime_env_hash));
        options.push(self.option("node-id", self.node_id));
        if let Some(kind) = self.io_kind {
            options.push(format!("--worker-kind={}", kind));
        }

        options.extend(self.dynamic_options.iter().cloned());
        options
    }

    pub fn build(&self) -> Vec<String> {
        let options = self.options();
        let mut argv = Vec::with_capacity(self.template.len() + options.len() + 1);

        if self.template.iter().any(|a| a == DYNAMIC_OPTION_PLACEHOLDER) {
            for arg in self.template {
                if arg == DYNAMIC_OPTION_PLACEHOLDER {
                    argv.extend(options.iter().cloned());
                } else {
                    argv.push(arg.clone());
                }
            }
        } else {
            argv.extend(self.template.iter().cloned());
            argv.extend(options);
        }

        argv.push(format!("--language={}", self.language.marker()));
        argv
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
