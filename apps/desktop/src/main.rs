use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{EcosystemStore, HttpBackend, StoreEvent};
use shared::{domain::Environment, protocol::TelemetryEventKind};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;

use commands::{parse_command, Command, CommandError, HELP};
use config::{load_settings, Settings, DEFAULT_SETTINGS_FILE};

#[derive(Parser, Debug)]
#[command(about = "Assemble an eight-species ecosystem and check it against the backend")]
struct Args {
    /// Backend base url, e.g. http://127.0.0.1:8000
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Overrides the 35 minute session length.
    #[arg(long)]
    session_seconds: Option<u32>,
}

impl Args {
    fn settings(&self) -> Settings {
        let mut settings = load_settings(&self.config);
        if let Some(url) = &self.server_url {
            settings.server_url = url.clone();
        }
        if let Some(seconds) = self.session_seconds.filter(|s| *s > 0) {
            settings.session_seconds = seconds;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let settings = args.settings();

    let backend = Arc::new(HttpBackend::new(&settings.server_url)?);
    let store = EcosystemStore::with_backend(settings.session_config(), backend);

    if store.load_catalog().await.is_err() {
        println!("Species catalog could not be loaded; continuing without species.");
    }
    store.start().await;
    let notifier = spawn_notifier(Arc::clone(&store));

    println!("{HELP}");
    println!("{}", render::format_snapshot(&store.snapshot().await));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(CommandError::Empty) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        store
            .record_event(
                TelemetryEventKind::Click,
                Some(serde_json::json!({ "command": command.name() })),
            )
            .await;

        if !run_command(&store, command).await {
            break;
        }
    }

    store.shutdown().await;
    notifier.abort();
    Ok(())
}

/// Applies one command. Returns `false` when the session should end.
async fn run_command(store: &Arc<EcosystemStore>, command: Command) -> bool {
    match command {
        Command::Help => println!("{HELP}"),
        Command::Catalog => println!("{}", render::format_catalog(&store.snapshot().await)),
        Command::Show => println!("{}", render::format_snapshot(&store.snapshot().await)),
        Command::Add(name) => {
            if !store.add_species_by_name(&name).await {
                println!("'{name}' was not added (unknown, already chosen, or ecosystem full)");
            }
            println!("{}", render::format_snapshot(&store.snapshot().await));
        }
        Command::Remove(name) => {
            if !store.remove_species(&name).await {
                println!("'{name}' is not in the ecosystem");
            }
            println!("{}", render::format_snapshot(&store.snapshot().await));
        }
        Command::Location(idx) => {
            if let Some(env) = Environment::preset(idx) {
                store.set_environment(env).await;
            }
            println!("{}", render::format_snapshot(&store.snapshot().await));
        }
        Command::Reset => {
            store.reset_session().await;
            println!("{}", render::format_snapshot(&store.snapshot().await));
        }
        Command::Flush => {
            let sent = store.flush_telemetry().await;
            println!("flushed {sent} telemetry events");
        }
        Command::Quit => return false,
    }
    true
}

/// Prints check verdicts and the end-of-time notice as they arrive.
fn spawn_notifier(store: Arc<EcosystemStore>) -> tokio::task::JoinHandle<()> {
    let mut events = store.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::ValidationApplied { .. }) => {
                    let snapshot = store.snapshot().await;
                    println!(
                        "check: {}",
                        render::format_validation(snapshot.validation.as_ref(), snapshot.gate_phase)
                    );
                }
                Ok(StoreEvent::SessionExpired) => println!("Time is up."),
                Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
