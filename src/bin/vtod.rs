//! VTO Daemon - keeps door station devices connected
//!
//! This binary runs as a background daemon. A controller adds and removes
//! devices over the local control socket; device state changes are posted
//! back to the controller's callback URL.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! vtod --apikey secret --callback http://127.0.0.1/plugins/vto/core/php/vto.php start
//!
//! # Start the daemon (background/daemonized)
//! vtod --apikey secret start -d
//!
//! # Stop the daemon
//! vtod --apikey secret stop
//!
//! # Check daemon status
//! vtod status
//!
//! # Enable debug logging
//! vtod --loglevel debug start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown, same as a `stop` command

use std::fs::{self, File};
use std::io::Write;
use std::net::TcpStream;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vto_protocol::ControlMessage;
use vtod::config::{
    DaemonConfig, DEFAULT_DAEMON_NAME, DEFAULT_PID_FILE, DEFAULT_SOCKET_HOST, DEFAULT_SOCKET_PORT,
};
use vtod::control::{ChannelExit, ControlChannel};
use vtod::logging;
use vtod::notify::{CallbackNotifier, LogNotifier, Notifier};
use vtod::pidfile;
use vtod::registry::spawn_registry;
use vtod::server::{ControlServer, QUEUE_CAPACITY};
use vtod::session::TcpEventClient;
use vtod::shutdown::Shutdown;
use vtod::supervisor::BackoffPolicy;

/// VTO daemon - door station connection supervisor
#[derive(Parser)]
#[command(name = "vtod", version, about)]
struct Args {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args)]
struct Options {
    /// Log level: debug, info, warning, error, none or off
    #[arg(long, env = "VTOD_LOGLEVEL", default_value = "error", global = true)]
    loglevel: String,

    /// PID file path
    #[arg(long, env = "VTOD_PIDFILE", default_value = DEFAULT_PID_FILE, global = true)]
    pidfile: PathBuf,

    /// Controller callback URL for state changes
    #[arg(long, env = "VTOD_CALLBACK", global = true)]
    callback: Option<String>,

    /// Shared secret for the control socket and the callback
    #[arg(long, env = "VTOD_APIKEY", hide_env_values = true, default_value = "", global = true)]
    apikey: String,

    /// Control socket host
    #[arg(long, env = "VTOD_SOCKETHOST", default_value = DEFAULT_SOCKET_HOST, global = true)]
    sockethost: String,

    /// Control socket port
    #[arg(long, env = "VTOD_SOCKETPORT", default_value_t = DEFAULT_SOCKET_PORT, global = true)]
    socketport: u16,

    /// Name used in log lines
    #[arg(long, env = "VTOD_DAEMONNAME", default_value = DEFAULT_DAEMON_NAME, global = true)]
    daemonname: String,

    /// Seconds between batched callback flushes (0 = send immediately)
    #[arg(long, env = "VTOD_CYCLE", default_value_t = 0.3, global = true)]
    cycle: f64,
}

impl Options {
    fn into_config(self) -> Result<DaemonConfig> {
        let mut config = DaemonConfig {
            pid_file: self.pidfile,
            apikey: self.apikey,
            socket_host: self.sockethost,
            socket_port: self.socketport,
            daemon_name: self.daemonname,
            ..DaemonConfig::default()
        }
        .with_log_level(&self.loglevel)?
        .with_cycle_secs(self.cycle)?;

        if let Some(callback) = self.callback.as_deref().filter(|c| !c.trim().is_empty()) {
            config = config.with_callback(callback)?;
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Returns the path to the log file used when daemonized.
fn log_file_path() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vto")
        .join("vtod.log")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.options.into_config()?;

    // Default to 'start' if no subcommand given
    let command = args.command.unwrap_or(Command::Start { daemon: false });

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = pidfile::running_pid(&config.pid_file) {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'vtod stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize()?;
            }

            run_daemon(config)
        }
        Command::Stop => stop_daemon(&config),
        Command::Status => {
            if let Some(pid) = pidfile::running_pid(&config.pid_file) {
                println!("Daemon is running (PID {pid})");
                println!("Control socket: {}", config.socket_addr());
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Sends a `stop` command over the control socket and waits for exit.
fn stop_daemon(config: &DaemonConfig) -> Result<()> {
    let Some(pid) = pidfile::running_pid(&config.pid_file) else {
        println!("Daemon is not running.");
        return Ok(());
    };

    println!("Stopping daemon (PID {pid})...");
    let line = ControlMessage::stop(config.apikey.as_str()).encode()?;
    let mut stream = TcpStream::connect(config.socket_addr())
        .with_context(|| format!("Failed to connect to {}", config.socket_addr()))?;
    stream
        .write_all(format!("{line}\n").as_bytes())
        .context("Failed to send stop command")?;
    drop(stream);

    // Wait for process to exit (up to 10 seconds)
    for _ in 0..100 {
        if !pidfile::is_process_running(pid) {
            println!("Daemon stopped.");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    eprintln!("Daemon did not stop within 10 seconds (check the apikey).");
    process::exit(1);
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point). Writes the PID file first and
/// always ends the process through [`Shutdown::exit`].
#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    logging::init(config.log_level);
    let shutdown = Shutdown::new(&config.pid_file);

    if let Err(e) = pidfile::write_pid(&config.pid_file) {
        error!(error = %e, "Failed to write PID file");
        shutdown.exit();
    }

    info!(
        daemon = %config.daemon_name,
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Daemon starting"
    );
    debug!(config = ?config, "Configuration");

    let root = CancellationToken::new();

    let signal_token = root.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    // The notifier outlives the control transport so the final flush
    // still reaches the backend.
    let notify_cancel = CancellationToken::new();
    let mut callback = None;
    let notifier: Arc<dyn Notifier> = match &config.callback {
        Some(url) => {
            let (notifier, flusher) = match CallbackNotifier::spawn(
                url.clone(),
                &config.apikey,
                config.cycle,
                notify_cancel.clone(),
            ) {
                Ok(spawned) => spawned,
                Err(e) => {
                    error!(error = %e, "Failed to create callback client");
                    shutdown.exit();
                }
            };
            if let Err(e) = notifier.test().await {
                error!(error = %e, "Notification backend check failed");
                shutdown.exit();
            }
            info!("Notification backend reachable");
            callback = Some((notifier.clone(), flusher));
            Arc::new(notifier)
        }
        None => {
            warn!("No callback configured, state changes are only logged");
            Arc::new(LogNotifier)
        }
    };

    let registry = spawn_registry(
        Arc::new(TcpEventClient::default()),
        notifier,
        BackoffPolicy::default(),
    );

    let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
    let server = match ControlServer::bind(&config.socket_addr(), queue_tx, root.clone()).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to open control socket");
            shutdown.exit();
        }
    };
    let server_task = tokio::spawn(server.run());

    let control = ControlChannel::new(config.apikey.as_str(), registry.clone(), root.clone());
    let exit = control.run(queue_rx).await;

    if exit != ChannelExit::StopRequested {
        match registry.stop_all().await {
            Ok(count) => info!(stopped = count, "All devices stopped"),
            Err(e) => warn!(error = %e, "Registry unavailable during shutdown"),
        }
    }

    root.cancel();
    if let Err(e) = server_task.await {
        debug!(error = %e, "Control server task failed");
    }

    if let Some((notifier, flusher)) = callback {
        if let Err(e) = notifier.flush().await {
            debug!(error = %e, "Final notification flush failed");
        }
        notify_cancel.cancel();
        if let Err(e) = flusher.await {
            debug!(error = %e, "Notification flusher task failed");
        }
    }

    info!(daemon = %config.daemon_name, "Daemon stopped");
    shutdown.exit()
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
