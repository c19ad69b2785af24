// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.
//!
//! Connection tasks only do I/O. Every request is forwarded to the event
//! loop as a [`Command`] and answered through a oneshot, so the pool is only
//! ever touched from one task.

use std::cell::RefCell;
use std::rc::Rc;

use corral_engine::{IoCallback, PopOutcome, WorkerPool};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::lifecycle::{Command, DaemonState};
use crate::protocol::{
    self, IoPoolKind, ProtocolError, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};

/// Handle a single client connection
pub async fn handle_connection(
    stream: UnixStream,
    commands: mpsc::Sender<Command>,
) -> Result<(), ServerError> {
    // Split stream for reading/writing
    let (mut reader, mut writer) = stream.into_split();

    // Read request with timeout
    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!("Received request: {:?}", request);

    let (reply, mut answer) = oneshot::channel();
    commands
        .send(Command { request, reply })
        .await
        .map_err(|_| ServerError::DaemonStopped)?;
    // Pops may wait on worker startup; no timeout here
    let response = tokio::select! {
        response = &mut answer => response.map_err(|_| ServerError::DaemonStopped)?,
        _ = hung_up(&mut reader) => {
            debug!("Client hung up before its reply was ready");
            // Later sends fail and the pool takes the worker back itself
            answer.close();
            if let Ok(response) = answer.try_recv() {
                reclaim(&commands, response).await;
            }
            return Ok(());
        }
    };

    debug!("Sending response: {:?}", response);

    // Write response with timeout
    if let Err(e) = protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await {
        reclaim(&commands, response).await;
        return Err(ServerError::Protocol(e));
    }

    Ok(())
}

/// Resolves once the client closes its end of the connection
async fn hung_up(reader: &mut OwnedReadHalf) {
    let mut buf = [0u8; 64];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Hand a worker that never reached its requester back to the pool
async fn reclaim(commands: &mpsc::Sender<Command>, response: Response) {
    let request = match response {
        Response::Lease { lease } => Request::PushWorker {
            worker_id: lease.worker_id,
        },
        Response::IoWorker { worker_id } => Request::PushIoWorker {
            kind: IoPoolKind::Delete,
            worker_id,
        },
        _ => return,
    };
    warn!("Requester gone, returning worker: {:?}", request);
    let (reply, _) = oneshot::channel();
    let _ = commands.send(Command { request, reply }).await;
}

/// Apply a request to the pool. Replies that depend on a later pool event
/// (pops, driver registration) are sent from the pool's callbacks.
pub fn handle_request(daemon: &mut DaemonState, request: Request, reply: oneshot::Sender<Response>) {
    let immediate = match request {
        Request::Hello { version: _ } => Some(Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        }),

        Request::Status => Some(Response::Status {
            uptime_secs: daemon.start_time.elapsed().as_secs(),
            stats: daemon.pool.stats(),
        }),

        Request::Shutdown => {
            daemon.shutdown_requested = true;
            Some(Response::ShuttingDown)
        }

        Request::RegisterWorker {
            worker_id,
            pid,
            startup_token,
        } => Some(ack(daemon.pool.register_worker(worker_id, pid, startup_token))),

        Request::AnnounceWorker { worker_id, port } => {
            Some(ack(daemon.pool.on_worker_started(&worker_id, port)))
        }

        Request::DisconnectWorker { worker_id } => {
            Some(ack(daemon.pool.disconnect_worker(&worker_id)))
        }

        Request::RegisterDriver {
            worker_id,
            pid,
            language,
            job_id,
            job_config,
        } => {
            let slot = Rc::new(RefCell::new(Some(reply)));
            let ready = Rc::clone(&slot);
            let on_ready = Box::new(move || {
                if let Some(reply) = ready.borrow_mut().take() {
                    let _ = reply.send(Response::Ok);
                }
            });
            if let Err(e) =
                daemon
                    .pool
                    .register_driver(worker_id, pid, language, job_id, job_config, on_ready)
            {
                if let Some(reply) = slot.borrow_mut().take() {
                    let _ = reply.send(Response::Error {
                        message: e.to_string(),
                    });
                }
            }
            daemon.flush();
            return;
        }

        Request::JobStarted { job_id, config } => {
            daemon.pool.handle_job_started(job_id, config);
            Some(Response::Ok)
        }

        Request::JobFinished { job_id } => {
            daemon.pool.handle_job_finished(job_id);
            Some(Response::Ok)
        }

        Request::PopWorker { spec } => {
            let callback = Box::new(move |outcome: PopOutcome| {
                // A closed receiver means the requester hung up; decline so
                // the worker goes to the next request or back to idle
                reply.send(pop_response(outcome)).is_ok()
            });
            daemon.pool.pop_worker(spec.into_request(), callback);
            daemon.flush();
            return;
        }

        Request::PushWorker { worker_id } => Some(ack(daemon.pool.push_worker(&worker_id))),

        Request::AssignTask {
            worker_id,
            task_id,
            root_detached_actor,
        } => Some(ack(
            daemon
                .pool
                .assign_task(&worker_id, task_id, root_detached_actor),
        )),

        Request::PrestartWorkers {
            language,
            runtime_env,
            num_needed,
        } => {
            daemon
                .pool
                .prestart_workers(language, runtime_env, num_needed);
            Some(Response::Ok)
        }

        Request::PopIoWorker { kind } => {
            let orphaned = Rc::clone(&daemon.orphaned_io);
            let callback: IoCallback = Box::new(move |worker_id| {
                if let Err(Response::IoWorker { worker_id }) =
                    reply.send(Response::IoWorker { worker_id })
                {
                    warn!(worker = %worker_id, "I/O requester gone, returning worker");
                    orphaned.borrow_mut().push(worker_id);
                }
            });
            pop_io(&mut daemon.pool, kind, callback);
            daemon.flush();
            return;
        }

        Request::PushIoWorker { kind, worker_id } => {
            let result = match kind {
                IoPoolKind::Spill => daemon.pool.push_spill_worker(&worker_id),
                IoPoolKind::Restore => daemon.pool.push_restore_worker(&worker_id),
                IoPoolKind::Delete => daemon.pool.push_delete_worker(&worker_id),
            };
            Some(ack(result))
        }
    };

    daemon.flush();
    if let Some(response) = immediate {
        let _ = reply.send(response);
    }
}

fn pop_io<L, C>(pool: &mut WorkerPool<L, C>, kind: IoPoolKind, callback: IoCallback)
where
    L: corral_adapters::ProcessLauncher,
    C: corral_core::Clock,
{
    match kind {
        IoPoolKind::Spill => pool.pop_spill_worker(callback),
        IoPoolKind::Restore => pool.pop_restore_worker(callback),
        IoPoolKind::Delete => pool.pop_delete_worker(callback),
    }
}

fn pop_response(outcome: PopOutcome) -> Response {
    match outcome.worker {
        Some(lease) if outcome.status.is_ok() => Response::Lease { lease },
        _ => Response::PopFailed {
            status: outcome.status,
            message: outcome.message,
        },
    }
}

fn ack(result: Result<(), corral_engine::PoolError>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(e) => Response::Error {
            message: e.to_string(),
        },
    }
}

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Request timeout")]
    Timeout,

    #[error("Daemon stopped before replying")]
    DaemonStopped,
}
