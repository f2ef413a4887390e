//! Bank Daemon - session, lock and ledger server
//!
//! This binary runs the bank server, accepting ATM, client-terminal and
//! teller connections over TCP.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! bankd start
//!
//! # Start with a config file, overriding the listen address
//! bankd start --config bank.toml --listen 0.0.0.0:7878
//!
//! # Start the daemon (background/daemonized)
//! bankd start -d
//!
//! # Stop the daemon
//! bankd stop
//!
//! # Check daemon status
//! bankd status
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bankd::config::DEFAULT_LISTEN;
use bankd::{BankConfig, BankServer, BankState, Ledger, LedgerSnapshot};

/// Bank daemon - multi-client banking backend
#[derive(Parser, Debug)]
#[command(name = "bankd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Path to a TOML config file (defaults to $BANK_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on, e.g. 127.0.0.1:7878
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("bank")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("bankd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("bankd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = i32::try_from(pid).context("PID out of range")?;
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        listen: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            listen,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'bankd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve before forking so config errors reach the terminal
            let mut config = BankConfig::resolve(config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(listen) = listen {
                config
                    .set_listen(&listen)
                    .context("Invalid --listen address")?;
            }

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");

                let listen = std::env::var(bankd::config::LISTEN_ENV)
                    .unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
                println!("Listen: {listen}");

                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

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

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

/// Loads the ledger from the snapshot file, or starts empty.
fn load_ledger(path: Option<&Path>) -> Result<Ledger> {
    let Some(path) = path else {
        warn!("No snapshot path configured; ledger is in-memory only");
        return Ok(Ledger::new());
    };

    match LedgerSnapshot::load(path).context("Failed to load ledger snapshot")? {
        Some(snapshot) => {
            Ledger::from_snapshot(snapshot).context("Ledger snapshot failed validation")
        }
        None => {
            info!(path = %path.display(), "No snapshot found, starting with an empty ledger");
            Ok(Ledger::new())
        }
    }
}

#[tokio::main]
async fn run_daemon(config: BankConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("bankd=info".parse()?)
                .add_directive("bank_core=info".parse()?)
                .add_directive("bank_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Bank daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let ledger = load_ledger(config.snapshot_path.as_deref())?;
    let state = BankState::new(ledger, config.rules.clone());

    let server = BankServer::bind(config.listen, state.clone(), cancel_token)
        .await
        .context("Failed to start server")?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    if let Some(path) = &config.snapshot_path {
        state
            .ledger
            .snapshot()
            .save(path)
            .context("Failed to save ledger snapshot")?;
    }

    info!("Bank daemon stopped");
    Ok(())
}

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
