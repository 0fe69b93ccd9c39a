//! Screen calibration operator console: entry point.
//!
//! Runs one calibration session at a time against a streaming agent.  The
//! operator types commands on stdin (see
//! [`calib_console::infrastructure::console_bridge`]); stream events and
//! session progress are printed as they happen.
//!
//! # Usage
//!
//! ```text
//! calib-console [OPTIONS]
//!
//! Options:
//!   --config   <FILE>   Console TOML configuration [default: calib-console.toml]
//!   --profile  <ID>     Start calibrating this profile immediately
//!   --operator <NAME>   Operator name recorded on coordinates [default: from config]
//! ```
//!
//! Log verbosity follows `RUST_LOG`, falling back to `[logging] level`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use calib_console::application::orchestrate_session::{
    FeedEvent, OrchestratorError, SessionOrchestrator,
};
use calib_console::application::run_calibration::CalibrationSessions;
use calib_console::infrastructure::console_bridge::{
    describe_session, parse_command, render_guide, ConsoleCommand,
};
use calib_console::infrastructure::journal::JournalRoot;
use calib_console::infrastructure::storage::config::ConsoleConfig;
use calib_console::infrastructure::storage::InMemoryProfileStore;
use calib_console::infrastructure::stream_channel::WebSocketChannel;
use calib_core::SessionError;

type Console = SessionOrchestrator<InMemoryProfileStore, WebSocketChannel>;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Screen calibration operator console.
#[derive(Debug, Parser)]
#[command(
    name = "calib-console",
    about = "Calibrates device UI coordinates from a live screen stream",
    version
)]
struct Cli {
    /// Console configuration file.  Missing file means built-in defaults.
    #[arg(long, default_value = "calib-console.toml", env = "CALIB_CONSOLE_CONFIG")]
    config: PathBuf,

    /// Profile to calibrate right after start-up.
    #[arg(long)]
    profile: Option<String>,

    /// Operator name; overrides `[operator] name`.
    #[arg(long)]
    operator: Option<String>,
}

impl Cli {
    /// Loads the configuration file and applies the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn into_console_config(self) -> anyhow::Result<(ConsoleConfig, Option<String>)> {
        let mut config = ConsoleConfig::load_from(&self.config)
            .with_context(|| format!("failed to load {}", self.config.display()))?;
        if let Some(operator) = self.operator {
            config.operator.name = operator;
        }
        Ok((config, self.profile))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, initial_profile) = Cli::parse().into_console_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let plan = config
        .calibration_plan()
        .context("invalid [[plan]] in console configuration")?;
    let store = Arc::new(
        InMemoryProfileStore::load_from(&config.storage.profiles_path).with_context(|| {
            format!("failed to load profiles from {}", config.storage.profiles_path.display())
        })?,
    );
    let channel = Arc::new(WebSocketChannel::new(
        config.agent.url.clone(),
        config.agent.open_timeout(),
    ));

    info!(
        "screen calibration console starting: agent={}, profiles={}, {} plan step(s)",
        config.agent.url,
        config.storage.profiles_path.display(),
        plan.len()
    );

    let sessions = CalibrationSessions::new(Arc::clone(&store), plan);
    let mut console = SessionOrchestrator::new(sessions, channel);
    if config.journal.enabled {
        console = console.with_journal(JournalRoot::new(config.journal.dir.clone()));
    }

    if let Some(profile_id) = initial_profile {
        start(&mut console, &profile_id, &config.operator.name).await;
    }

    run_console(&mut console, &config.operator.name).await;

    if let Some(id) = console.active_session_id() {
        console.cancel_session(id).await;
    }
    store
        .save_to(&config.storage.profiles_path)
        .await
        .with_context(|| format!("failed to save {}", config.storage.profiles_path.display()))?;

    info!("screen calibration console stopped");
    Ok(())
}

/// Processes stdin commands, stream events and Ctrl+C in arrival order.
async fn run_console(console: &mut Console, operator: &str) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, leaving console");
                break;
            }
            event = console.next_event(), if console.has_feed() => {
                if let Some(event) = event {
                    print_event(&event);
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_line(console, operator, &line).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                }
            }
        }
    }
}

/// Runs one command line.  Returns `false` when the operator quits.
async fn handle_line(console: &mut Console, operator: &str, line: &str) -> bool {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            println!("{e}");
            return true;
        }
    };

    match command {
        ConsoleCommand::Start { profile_id } => start(console, &profile_id, operator).await,
        ConsoleCommand::Click(click) => {
            let Some(session_id) = console.active_session_id() else {
                println!("no active session; use: start <profile_id>");
                return true;
            };
            match console
                .submit_coordinate(session_id, click.pointer, click.render_width, click.render_height)
                .await
            {
                Ok(session) => println!("{}", describe_session(&session, console.connectivity())),
                Err(e) => report_error(console, session_id, e).await,
            }
        }
        ConsoleCommand::Status => print_status(console).await,
        ConsoleCommand::Guide => println!("{}", render_guide(&console.sessions().guide())),
        ConsoleCommand::Cancel => match console.active_session_id() {
            Some(id) => {
                console.cancel_session(id).await;
                println!("session {id} cancelled");
            }
            None => println!("no active session"),
        },
        ConsoleCommand::Reconnect => {
            if let Err(e) = console.reconnect().await {
                println!("{e}");
            }
        }
        ConsoleCommand::Quit => return false,
    }
    true
}

async fn start(console: &mut Console, profile_id: &str, operator: &str) {
    match console.sessions().seed_default_coordinates(profile_id).await {
        Ok(0) | Err(_) => {}
        Ok(n) => info!("profile {profile_id}: {n} default coordinate(s) seeded"),
    }
    match console.start_session(profile_id, operator).await {
        Ok(session) => println!("{}", describe_session(&session, console.connectivity())),
        Err(e) => println!("cannot start calibration: {e}"),
    }
}

async fn print_status(console: &Console) {
    match console.active_session_id() {
        Some(id) => match console.sessions().get(id).await {
            Ok(session) => println!("{}", describe_session(&session, console.connectivity())),
            Err(e) => println!("{e}"),
        },
        None => println!("no active session"),
    }
}

/// Prints a rejected click.  Session-level errors also reprint where the
/// console now stands.
async fn report_error(console: &Console, session_id: calib_core::SessionId, error: OrchestratorError) {
    println!("click rejected: {error}");
    if matches!(
        error,
        OrchestratorError::Session(
            SessionError::SessionNotFound(_) | SessionError::SessionAlreadyTerminal { .. }
        )
    ) {
        match console.sessions().get(session_id).await {
            Ok(session) => println!("{}", describe_session(&session, console.connectivity())),
            Err(_) => print_status(console).await,
        }
    }
}

fn print_event(event: &FeedEvent) {
    match event {
        FeedEvent::Connected { device_id } => println!("stream connected: {device_id}"),
        FeedEvent::Frame(frame) => {
            tracing::debug!(
                "frame from {}: {}x{} {} ({} bytes)",
                frame.device_id,
                frame.width,
                frame.height,
                frame.format,
                frame.image.len()
            );
        }
        FeedEvent::Error { kind, message } => println!("stream error ({kind:?}): {message}"),
        FeedEvent::Disconnected { reason } => {
            println!("stream disconnected: {reason} (type 'reconnect' to retry)")
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
