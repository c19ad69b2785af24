// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for an external runtime env agent
//!
//! The agent exposes two JSON endpoints:
//!
//! - `POST /get_or_create_runtime_env` with
//!   `{"job_id", "serialized_runtime_env", "runtime_env_config"}`
//! - `POST /delete_runtime_env_if_possible` with `{"serialized_runtime_env"}`
//!
//! Both reply `{"status": "ok" | "failed", "context"?, "error"?}`.

use super::{RuntimeEnvError, RuntimeEnvGate};
use async_trait::async_trait;
use corral_core::{JobId, RuntimeEnvConfig, RuntimeEnvInfo};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct CreateRequest<'a> {
    job_id: Option<String>,
    serialized_runtime_env: &'a str,
    runtime_env_config: &'a RuntimeEnvConfig,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    serialized_runtime_env: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReplyStatus {
    Ok,
    Failed,
}

#[derive(Debug, Deserialize)]
struct Reply {
    status: ReplyStatus,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Gate backed by a runtime env agent reachable over HTTP
#[derive(Clone, Debug)]
pub struct AgentRuntimeEnvGate {
    base_url: String,
}

impl AgentRuntimeEnvGate {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, endpoint: &str, body: String) -> Result<Reply, RuntimeEnvError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tokio::task::spawn_blocking(move || post_blocking(&url, body))
            .await
            .map_err(|e| RuntimeEnvError::Agent(format!("request task failed: {}", e)))?
    }
}

fn post_blocking(url: &str, body: String) -> Result<Reply, RuntimeEnvError> {
    let mut response = ureq::post(url)
        .header("Content-Type", "application/json")
        .send(body)
        .map_err(|e| RuntimeEnvError::Agent(format!("{}: {}", url, e)))?;
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| RuntimeEnvError::Agent(format!("failed to read response: {}", e)))?;
    parse_reply(&text)
}

fn parse_reply(text: &str) -> Result<Reply, RuntimeEnvError> {
    serde_json::from_str(text)
        .map_err(|e| RuntimeEnvError::Agent(format!("malformed reply: {}", e)))
}

fn encode<T: Serialize>(body: &T) -> Result<String, RuntimeEnvError> {
    serde_json::to_string(body).map_err(|e| RuntimeEnvError::Agent(e.to_string()))
}

#[async_trait]
impl RuntimeEnvGate for AgentRuntimeEnvGate {
    async fn get_or_create(
        &self,
        job_id: Option<JobId>,
        env: &RuntimeEnvInfo,
    ) -> Result<String, RuntimeEnvError> {
        let body = encode(&CreateRequest {
            job_id: job_id.map(JobId::to_hex),
            serialized_runtime_env: &env.serialized,
            runtime_env_config: &env.config,
        })?;
        let reply = self.post("get_or_create_runtime_env", body).await?;
        match reply.status {
            ReplyStatus::Ok => Ok(reply.context.unwrap_or_else(|| "{}".to_string())),
            ReplyStatus::Failed => Err(RuntimeEnvError::CreationFailed(
                reply.error.unwrap_or_else(|| "runtime env creation failed".to_string()),
            )),
        }
    }

    async fn release(&self, env: &RuntimeEnvInfo) -> Result<(), RuntimeEnvError> {
        let body = encode(&DeleteRequest {
            serialized_runtime_env: &env.serialized,
        })?;
        let reply = self.post("delete_runtime_env_if_possible", body).await?;
        match reply.status {
            ReplyStatus::Ok => Ok(()),
            ReplyStatus::Failed => Err(RuntimeEnvError::Agent(
                reply.error.unwrap_or_else(|| "release rejected".to_string()),
            )),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
