// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, pool event plumbing.

use std::cell::RefCell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use corral_adapters::{
    AgentRuntimeEnvGate, CommandLauncher, NoOpRuntimeEnvGate, RuntimeEnvError, RuntimeEnvGate,
    SignalExitClient, TracedExitClient, TracedLauncher, TracedRuntimeEnvGate,
};
use corral_core::{JobId, NodeId, PoolConfig, RuntimeEnvInfo, SystemClock, WorkerId};
use corral_engine::{Executor, PoolEvent, Scheduler, WorkerPool};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::protocol::{Request, Response};

/// Pool with the production launcher
pub type DaemonPool = WorkerPool<TracedLauncher<CommandLauncher>, SystemClock>;

/// Executor with the production gate and exit client
pub type DaemonExecutor =
    Executor<TracedRuntimeEnvGate<DaemonGate>, TracedExitClient<SignalExitClient>>;

/// Runtime env gate chosen at startup
#[derive(Clone)]
pub enum DaemonGate {
    NoOp(NoOpRuntimeEnvGate),
    Agent(AgentRuntimeEnvGate),
}

#[async_trait]
impl RuntimeEnvGate for DaemonGate {
    async fn get_or_create(
        &self,
        job_id: Option<JobId>,
        env: &RuntimeEnvInfo,
    ) -> Result<String, RuntimeEnvError> {
        match self {
            DaemonGate::NoOp(gate) => gate.get_or_create(job_id, env).await,
            DaemonGate::Agent(gate) => gate.get_or_create(job_id, env).await,
        }
    }

    async fn release(&self, env: &RuntimeEnvInfo) -> Result<(), RuntimeEnvError> {
        match self {
            DaemonGate::NoOp(gate) => gate.release(env).await,
            DaemonGate::Agent(gate) => gate.release(env).await,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    pub pool: PoolConfig,
    pub node_id: NodeId,
    /// Base URL of the runtime env agent; envs are not materialized if unset
    pub runtime_env_agent: Option<String>,
}

impl Config {
    pub fn new(state_dir: &Path, pool: PoolConfig, node_id: NodeId) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            socket_path: state_dir.join("corrald.sock"),
            lock_path: state_dir.join("corrald.pid"),
            log_path: state_dir.join("corrald.log"),
            pool,
            node_id,
            runtime_env_agent: None,
        }
    }

    /// Period of the timer tick; never coarser than the idle sweep
    pub fn tick_interval(&self) -> Duration {
        self.pool
            .kill_idle_workers_interval
            .min(Duration::from_secs(1))
    }
}

/// A request forwarded from a connection task to the event loop
pub struct Command {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Unix socket listener
    pub listener: UnixListener,
    pub pool: DaemonPool,
    executor: DaemonExecutor,
    /// Timers set by the pool (shared with executor)
    pub scheduler: Arc<Mutex<Scheduler>>,
    /// Completions of effects run by the executor
    pub events: mpsc::Receiver<PoolEvent>,
    /// Requests from connection tasks
    pub commands: mpsc::Receiver<Command>,
    pub commands_tx: mpsc::Sender<Command>,
    /// I/O workers whose requester hung up before delivery
    pub(crate) orphaned_io: Rc<RefCell<Vec<WorkerId>>>,
    /// When daemon started
    pub start_time: Instant,
    /// Shutdown requested flag
    pub shutdown_requested: bool,
}

impl DaemonState {
    /// Hand effects queued by the pool to the executor
    pub fn flush(&mut self) {
        let orphaned: Vec<WorkerId> = self.orphaned_io.borrow_mut().drain(..).collect();
        for worker_id in orphaned {
            if let Err(e) = self.pool.push_delete_worker(&worker_id) {
                warn!(worker = %worker_id, error = %e, "could not return undelivered I/O worker");
            }
        }
        let effects = self.pool.take_effects();
        self.executor.execute_all(effects);
    }

    /// Feed an effect completion back into the pool
    pub fn process_event(&mut self, event: PoolEvent) {
        self.pool.handle_event(event);
        self.flush();
    }

    /// Fire due timers
    pub fn check_timers(&mut self) {
        let fired = {
            let mut scheduler = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
            scheduler.fired_timers(Instant::now())
        };
        for id in fired {
            self.process_event(PoolEvent::TimerFired(id));
        }
    }

    /// Shutdown the daemon gracefully
    pub fn shutdown(&mut self) {
        info!("Shutting down daemon...");

        self.pool.shutdown();
        self.flush();

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!("Daemon shutdown complete");
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] corral_core::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // The files belong to the daemon holding the lock
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    let lock_file = File::create(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    let mut lock_file = lock_file;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 3. Validate config before binding (fail fast)
    config.pool.validate()?;

    // 4. Set up adapters (wrapped with tracing for observability)
    let gate = match &config.runtime_env_agent {
        Some(url) => DaemonGate::Agent(AgentRuntimeEnvGate::new(url.clone())),
        None => DaemonGate::NoOp(NoOpRuntimeEnvGate::new()),
    };
    let launcher = TracedLauncher::new(CommandLauncher::new());
    let exits = TracedExitClient::new(SignalExitClient::new());

    // 5. Event and command channels
    let (events_tx, events) = mpsc::channel(256);
    let (commands_tx, commands) = mpsc::channel(256);

    // 6. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    let scheduler = Arc::new(Mutex::new(Scheduler::new()));
    let executor = Executor::new(
        TracedRuntimeEnvGate::new(gate),
        exits,
        Arc::clone(&scheduler),
        events_tx,
    );
    let pool = WorkerPool::new(
        config.pool.clone(),
        config.node_id.clone(),
        launcher,
        SystemClock,
        capacity(&config.pool),
    );

    info!(node = %config.node_id, "{}", config.pool.summary());

    let mut state = DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        pool,
        executor,
        scheduler,
        events,
        commands,
        commands_tx,
        orphaned_io: Rc::new(RefCell::new(Vec::new())),
        start_time: Instant::now(),
        shutdown_requested: false,
    };
    state.flush();
    Ok(state)
}

/// Idle soft limit source: the configured override, else the CPUs this
/// process may run on right now
fn capacity(config: &PoolConfig) -> corral_engine::Capacity {
    match config.available_cpus {
        Some(cpus) => Box::new(move || cpus),
        None => Box::new(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }),
    }
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// Default state directory for corrald
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("corral"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/corral"))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
