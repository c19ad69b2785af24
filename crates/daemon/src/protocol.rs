// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between corrald and its clients.
//!
//! Each message is a 4-byte big-endian length followed by a JSON body.
//! A connection carries one request and one response.

use std::time::Duration;

use corral_core::{
    ActorId, JobConfig, JobId, Language, PopStatus, RuntimeEnvInfo, StartupToken, TaskId,
    WorkerId,
};
use corral_engine::{PoolStats, PopRequest, WorkerLease};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version reported in `Hello`
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default timeout for reading a request or writing a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted message body
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Which I/O pool a request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoPoolKind {
    Spill,
    Restore,
    /// Borrow from whichever pool has more idle workers
    Delete,
}

/// Wire form of a pop request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopSpec {
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_env: Option<RuntimeEnvInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_detached_actor: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_gpu: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_actor_worker: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_options: Vec<String>,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub keep_alive: Option<Duration>,
    #[serde(default = "default_queue")]
    pub queue_if_saturated: bool,
}

fn default_queue() -> bool {
    true
}

impl PopSpec {
    pub fn new(language: Language, job_id: Option<JobId>) -> Self {
        Self {
            language,
            job_id,
            runtime_env: None,
            root_detached_actor: None,
            is_gpu: None,
            is_actor_worker: None,
            dynamic_options: Vec::new(),
            keep_alive: None,
            queue_if_saturated: true,
        }
    }

    pub fn into_request(self) -> PopRequest {
        let mut request = PopRequest::new(self.language, self.job_id)
            .with_dynamic_options(self.dynamic_options);
        if let Some(env) = self.runtime_env {
            request = request.with_runtime_env(env);
        }
        if let Some(actor) = self.root_detached_actor {
            request = request.with_root_detached_actor(actor);
        }
        if let Some(keep_alive) = self.keep_alive {
            request = request.with_keep_alive(keep_alive);
        }
        request.is_gpu = self.is_gpu;
        request.is_actor_worker = self.is_actor_worker;
        request.queue_if_saturated = self.queue_if_saturated;
        request
    }
}

/// Request from a client to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Hello {
        version: String,
    },
    Status,
    Shutdown,

    /// A spawned worker connected and presented its startup token
    RegisterWorker {
        worker_id: WorkerId,
        pid: u32,
        startup_token: StartupToken,
    },
    /// A registered worker is ready for work
    AnnounceWorker {
        worker_id: WorkerId,
        #[serde(default)]
        port: Option<u16>,
    },
    DisconnectWorker {
        worker_id: WorkerId,
    },
    /// Replies once driver registration completes
    RegisterDriver {
        worker_id: WorkerId,
        pid: u32,
        language: Language,
        job_id: JobId,
        #[serde(default)]
        job_config: JobConfig,
    },

    JobStarted {
        job_id: JobId,
        #[serde(default)]
        config: JobConfig,
    },
    JobFinished {
        job_id: JobId,
    },

    /// Replies with a lease once a worker is available
    PopWorker {
        spec: PopSpec,
    },
    PushWorker {
        worker_id: WorkerId,
    },
    AssignTask {
        worker_id: WorkerId,
        task_id: TaskId,
        #[serde(default)]
        root_detached_actor: Option<ActorId>,
    },
    PrestartWorkers {
        language: Language,
        #[serde(default)]
        runtime_env: RuntimeEnvInfo,
        num_needed: usize,
    },

    PopIoWorker {
        kind: IoPoolKind,
    },
    PushIoWorker {
        kind: IoPoolKind,
        worker_id: WorkerId,
    },
}

/// Response from the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Hello {
        version: String,
    },
    Ok,
    Lease {
        lease: WorkerLease,
    },
    PopFailed {
        status: PopStatus,
        message: String,
    },
    IoWorker {
        worker_id: WorkerId,
    },
    Status {
        uptime_secs: u64,
        stats: PoolStats,
    },
    ShuttingDown,
    Error {
        message: String,
    },
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Serialize a message body (no length prefix)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write a length-prefixed message
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(data.len() as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed message
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

/// Client side: send one request and wait up to `timeout` for the reply
pub async fn call<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    request: &Request,
    timeout: Duration,
) -> Result<Response, ProtocolError> {
    let data = encode(request)?;
    tokio::time::timeout(timeout, write_message(stream, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    let bytes = tokio::time::timeout(timeout, read_message(stream))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
