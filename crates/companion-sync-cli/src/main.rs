//! Companion Sync CLI
//!
//! Thin wrapper around companion-sync-core for trying the engine out and for
//! inspecting wire payloads.
//!
//! ## Usage
//!
//! ```bash
//! # Run a primary and a companion over an in-memory link
//! companion-sync simulate
//!
//! # Same, with the companion out of reach while the primary keeps pushing
//! companion-sync simulate --offline-push
//!
//! # Print the snapshot payload for some content
//! companion-sync encode --message "Small steps" --character Sage --todo walk:done --todo "drink water"
//!
//! # Classify a payload received from a device
//! companion-sync decode '{"action":"todoCompletion","todoText":"walk","isCompleted":true}'
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use companion_sync_core::dispatch::KEY_STATUS;
use companion_sync_core::logging::JsonlLayer;
use companion_sync_core::types::snapshot::KEY_MENTOR_MESSAGE;
use companion_sync_core::{
    CompanionEngine, ContextSnapshot, DeviceRole, EngineConfig, EngineHandle, LoopbackTransport,
    ObservedState, Payload, PointMessage, SnapshotClock,
};

/// Companion Sync - primary/companion journal sync
#[derive(Parser)]
#[command(name = "companion-sync")]
#[command(version = "0.1.0")]
#[command(about = "Companion Sync - primary/companion journal sync")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write JSONL logs under this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a primary and a companion over an in-memory link
    Simulate {
        /// Take the companion out of reach while the primary pushes
        #[arg(long)]
        offline_push: bool,
    },

    /// Print the snapshot wire payload for the given content
    Encode {
        /// Mentor message
        #[arg(short, long)]
        message: String,

        /// Mentor character
        #[arg(short = 'C', long)]
        character: String,

        /// Action item, optionally suffixed with ":done"
        #[arg(short, long = "todo")]
        todos: Vec<String>,

        /// Fixed timestamp (seconds since epoch) instead of now
        #[arg(long)]
        timestamp: Option<f64>,
    },

    /// Classify a JSON payload as a snapshot or point message
    Decode {
        /// The payload as JSON text
        json: String,
    },
}

fn setup_logging(verbosity: u8, log_dir: Option<&Path>, device: &str) -> Result<()> {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let jsonl = match log_dir {
        Some(dir) => Some(
            JsonlLayer::new(dir, device)
                .with_context(|| format!("Failed to open log directory {}", dir.display()))?,
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(jsonl)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Parse `text[:done]`. Any other suffix is part of the text.
fn parse_todo(arg: &str) -> (String, bool) {
    match arg.rsplit_once(':') {
        Some((text, "done")) | Some((text, "x")) => (text.to_string(), true),
        Some((text, "todo")) => (text.to_string(), false),
        _ => (arg.to_string(), false),
    }
}

fn parse_payload(json: &str) -> Result<Payload> {
    match serde_json::from_str::<serde_json::Value>(json).context("Payload is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("Payload must be a JSON object, got {}", other),
    }
}

async fn settle(engines: &[&EngineHandle]) -> Result<()> {
    for _ in 0..4 {
        for engine in engines {
            engine.flush().await?;
        }
    }
    Ok(())
}

fn print_state(device: &str, state: &ObservedState) {
    println!("== {} ==", device);
    println!("{}", state);
    println!();
}

async fn simulate(config: EngineConfig, offline_push: bool) -> Result<()> {
    let (primary_end, companion_end) = LoopbackTransport::pair();
    let primary = CompanionEngine::spawn(
        primary_end.clone(),
        EngineConfig {
            role: DeviceRole::Primary,
            ..config.clone()
        },
    )?;
    let companion = CompanionEngine::spawn(
        companion_end.clone(),
        EngineConfig {
            role: DeviceRole::Companion,
            ..config
        },
    )?;

    primary.set_up().await?;
    companion.set_up().await?;
    settle(&[&primary, &companion]).await?;
    info!("Both sessions activated");

    let todos = vec![
        "Take a short walk".to_string(),
        "Drink a glass of water".to_string(),
        "Write one line of gratitude".to_string(),
    ];
    primary
        .update_mentor_message("Small steps still count.", "Sage")
        .await?;
    primary
        .update_action_todos(todos.clone(), vec![false; todos.len()])
        .await?;
    settle(&[&primary, &companion]).await?;

    if offline_push {
        primary_end.set_reachable(false);
        settle(&[&primary, &companion]).await?;
        println!("companion out of reach");

        primary
            .update_mentor_message("Rest is part of the work.", "Sage")
            .await?;
        let toggle = primary.set_completion(&todos[2], true).await?;
        println!(
            "primary toggled {:?}: push {:?}, message {:?}",
            todos[2], toggle.push, toggle.message
        );
        println!(
            "held for companion: {}",
            if companion_end.has_pending_context() { "1 snapshot" } else { "nothing" }
        );

        primary_end.set_reachable(true);
        settle(&[&primary, &companion]).await?;
        println!("companion back in reach");
    }

    let toggle = companion.set_completion(&todos[0], true).await?;
    println!(
        "companion toggled {:?}: message {:?}",
        todos[0], toggle.message
    );
    settle(&[&primary, &companion]).await?;
    println!();

    let primary_state = primary.observed();
    let companion_state = companion.observed();
    print_state("primary", &primary_state);
    print_state("companion", &companion_state);

    let in_sync = primary_state.mentor_message == companion_state.mentor_message
        && primary_state.action_todos == companion_state.action_todos
        && primary_state.todo_completion_status == companion_state.todo_completion_status;
    println!("in sync: {}", if in_sync { "yes" } else { "no" });

    let stats = companion.stats().await?;
    println!(
        "companion received {} snapshot(s), sent {} message(s), dropped {}",
        stats.snapshots_received, stats.dispatch.sent, stats.dispatch.dropped
    );

    primary.shutdown().await?;
    companion.shutdown().await?;
    Ok(())
}

fn encode(
    message: String,
    character: String,
    todos: &[String],
    timestamp: Option<f64>,
) -> Result<()> {
    let (texts, flags): (Vec<String>, Vec<bool>) = todos.iter().map(|t| parse_todo(t)).unzip();
    let timestamp = timestamp.unwrap_or_else(|| SnapshotClock::new().next());
    let snapshot = ContextSnapshot::new(message, character, texts, flags, timestamp)?;

    let json = serde_json::to_string_pretty(&serde_json::Value::Object(snapshot.to_payload()?))?;
    println!("{}", json);
    Ok(())
}

fn decode(json: &str) -> Result<()> {
    let payload = parse_payload(json)?;

    if payload.contains_key(KEY_MENTOR_MESSAGE) {
        match ContextSnapshot::from_payload(&payload) {
            Ok(snapshot) => {
                println!("snapshot");
                println!("  mentor:    {} says {:?}", snapshot.mentor_character(), snapshot.mentor_message());
                println!("  timestamp: {}", snapshot.timestamp());
                for (text, done) in snapshot.action_texts().iter().zip(snapshot.action_completion()) {
                    println!("  [{}] {}", if *done { "x" } else { " " }, text);
                }
            }
            Err(error) => println!("dropped: {}", error),
        }
        return Ok(());
    }

    if payload.contains_key(KEY_STATUS) {
        println!("acknowledgement");
        return Ok(());
    }

    match PointMessage::from_payload(&payload) {
        Ok(PointMessage::TodoCompletion(event)) => println!(
            "point message: todoCompletion {:?} -> {}",
            event.action_identifier,
            if event.is_completed { "done" } else { "ready" }
        ),
        Ok(PointMessage::InitialDataRequest) => println!("point message: initialData request"),
        Err(error) => println!("dropped: {}", error),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    setup_logging(cli.verbose, cli.log_dir.as_deref(), config.role.as_str())?;

    match cli.command {
        Commands::Simulate { offline_push } => simulate(config, offline_push).await?,
        Commands::Encode {
            message,
            character,
            todos,
            timestamp,
        } => encode(message, character, &todos, timestamp)?,
        Commands::Decode { json } => decode(&json)?,
    }

    Ok(())
}
