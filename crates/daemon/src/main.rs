// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Corral worker pool daemon (corrald)
//!
//! Background process that owns the worker pool for one node and serves
//! pool requests over a Unix socket.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;

use clap::Parser;
use corral_core::{NodeId, PoolConfig};
use corral_daemon::lifecycle::{self, Config, LifecycleError};
use corral_daemon::server;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "corrald", version, about = "Corral - worker pool daemon")]
struct Args {
    /// Pool configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the socket, PID file and log
    #[arg(long, env = "CORRAL_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Node identifier; random if unset
    #[arg(long)]
    node_id: Option<String>,

    /// Base URL of the runtime env agent
    #[arg(long, env = "CORRAL_RUNTIME_ENV_AGENT")]
    runtime_env_agent: Option<String>,

    /// Print the effective pool configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let pool = match &args.config {
        Some(path) => PoolConfig::load(path)?,
        None => PoolConfig::default(),
    };
    if args.print_config {
        print!("{}", pool.to_toml()?);
        return Ok(());
    }
    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None => lifecycle::state_dir()?,
    };
    let node_id = args
        .node_id
        .map(NodeId::from)
        .unwrap_or_else(|| NodeId::from(uuid::Uuid::new_v4().to_string()));
    let mut config = Config::new(&state_dir, pool, node_id);
    config.runtime_env_agent = args.runtime_env_agent;

    // Write startup marker to log (before tracing setup, so callers can find it)
    write_startup_marker(&config)?;

    // Set up logging
    let log_guard = setup_logging(&config)?;

    info!("Starting corrald in {}", state_dir.display());

    // Start daemon
    let mut daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        "Daemon ready, listening on {}",
        config.socket_path.display()
    );

    // Signal ready for parent process (e.g., systemd, node agent waiting for startup)
    println!("READY");

    let mut tick = tokio::time::interval(config.tick_interval());
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Main event loop
    loop {
        tokio::select! {
            // Accept client connections
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let commands = daemon.commands_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(stream, commands).await {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            // Requests read by connection tasks
            Some(command) = daemon.commands.recv() => {
                server::handle_request(&mut daemon, command.request, command.reply);
            }

            // Completions of effects run by the executor
            Some(event) = daemon.events.recv() => {
                daemon.process_event(event);
            }

            // Registration timeouts and the idle sweep
            _ = tick.tick() => {
                daemon.check_timers();
            }

            // Graceful shutdown on SIGTERM
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                daemon.shutdown();
                break;
            }

            // Graceful shutdown on SIGINT
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                daemon.shutdown();
                break;
            }
        }

        // Check if shutdown was requested via IPC
        if daemon.shutdown_requested {
            info!("Shutdown requested via IPC, shutting down...");
            daemon.shutdown();
            break;
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// Full format: "--- corrald: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- corrald: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    // Create log directory if needed
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Append marker to log file with PID
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Create log directory if needed
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Set up file appender
    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Set up subscriber with env filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
