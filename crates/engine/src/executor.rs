// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor
//!
//! Runs the pool's effects against the runtime env gate and the exit
//! client. Remote calls run as spawned tasks; their completions come back
//! as [`PoolEvent`]s on the event channel.

use crate::effect::{Effect, PoolEvent};
use crate::scheduler::Scheduler;
use corral_adapters::{ExitClient, RuntimeEnvGate};
use corral_core::{Clock, SystemClock};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Executes effects using the configured adapters
pub struct Executor<G, E> {
    gate: G,
    exits: E,
    scheduler: Arc<Mutex<Scheduler>>,
    events: mpsc::Sender<PoolEvent>,
    clock: SystemClock,
}

impl<G, E> Executor<G, E>
where
    G: RuntimeEnvGate,
    E: ExitClient,
{
    pub fn new(
        gate: G,
        exits: E,
        scheduler: Arc<Mutex<Scheduler>>,
        events: mpsc::Sender<PoolEvent>,
    ) -> Self {
        Self {
            gate,
            exits,
            scheduler,
            events,
            clock: SystemClock,
        }
    }

    pub fn execute_all(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    /// Execute a single effect. Must be called within a tokio runtime.
    pub fn execute(&self, effect: Effect) {
        let span = tracing::debug_span!("effect", effect = effect.name());
        let _guard = span.enter();

        match effect {
            Effect::AcquireRuntimeEnv {
                ticket,
                job_id,
                runtime_env,
            } => {
                let gate = self.gate.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let result = gate
                        .get_or_create(job_id, &runtime_env)
                        .await
                        .map_err(|e| e.to_string());
                    if events
                        .send(PoolEvent::RuntimeEnvCreated { ticket, result })
                        .await
                        .is_err()
                    {
                        tracing::debug!(ticket = ticket.0, "event loop gone, dropping runtime env reply");
                    }
                });
            }

            Effect::ReleaseRuntimeEnv { runtime_env } => {
                let gate = self.gate.clone();
                tokio::spawn(async move {
                    if let Err(e) = gate.release(&runtime_env).await {
                        tracing::warn!(error = %e, "failed to release runtime env");
                    }
                });
            }

            Effect::SendExit {
                worker_id,
                pid,
                force,
            } => {
                let exits = self.exits.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    // An undeliverable request counts as declined; the next
                    // sweep retries it.
                    let accepted = match exits.exit(&worker_id, pid, force).await {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(worker = %worker_id, error = %e, "exit request failed");
                            false
                        }
                    };
                    let _ = events
                        .send(PoolEvent::ExitReplied {
                            worker_id,
                            accepted,
                        })
                        .await;
                });
            }

            Effect::SetTimer { id, after } => {
                let now = self.clock.now();
                self.scheduler
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .set_timer(id, after, now);
            }

            Effect::CancelTimer { id } => {
                self.scheduler
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .cancel_timer(&id);
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
