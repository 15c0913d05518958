//! `relay server`: listener, store and console sink.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use clap::Args;
use tokio::sync::mpsc;
use tracing::{error, info};

use telemetry_relay::core::{DEFAULT_BIND_ADDR, TIMESTAMP_FORMAT};
use telemetry_relay::server::{ServerEvent, SqliteStore, TelemetryServer, TelemetryServerBuilder};
use telemetry_relay::{Codec, RelayError};

use crate::settings::{KeyArgs, ServerSettings};

/// Accept snapshots from clients and store them.
#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_BIND_ADDR, env = "RELAY_BIND_ADDR")]
    pub bind: SocketAddr,

    /// SQLite database file.
    #[arg(long, default_value = "relay.db", env = "RELAY_DB_PATH", value_name = "PATH")]
    pub db: PathBuf,

    /// JSON settings file, e.g. {"emergency_timeout": 30}.
    #[arg(long, env = "RELAY_SETTINGS", value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Override the emergency timeout from the settings file, in seconds.
    #[arg(long, value_name = "SECS")]
    pub emergency_timeout: Option<u64>,

    #[command(flatten)]
    pub key: KeyArgs,
}

/// Start the server and print events until Ctrl-C.
pub async fn run(args: ServerArgs) -> Result<(), RelayError> {
    let key = args.key.load()?;
    let settings = ServerSettings::load(args.settings.as_deref())?;
    let emergency_timeout = match args.emergency_timeout {
        Some(0) => {
            return Err(RelayError::Config(
                "--emergency-timeout must be at least 1 second".to_string(),
            ));
        }
        Some(secs) => std::time::Duration::from_secs(secs),
        None => settings.emergency_timeout(),
    };

    let store = SqliteStore::open(&args.db)
        .map_err(|e| RelayError::Config(format!("cannot open {}: {e}", args.db.display())))?;

    let config = TelemetryServerBuilder::new()
        .bind_addr(args.bind)
        .emergency_timeout(emergency_timeout)
        .build();
    let (server, events) = TelemetryServer::bind(config, Codec::new(key), Arc::new(store))
        .await
        .map_err(|e| RelayError::Config(e.to_string()))?;

    info!(
        addr = %server.local_addr(),
        db = %args.db.display(),
        ?emergency_timeout,
        "relay server ready"
    );
    let sink = tokio::spawn(print_events(events));

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    // The server owned the only senders; the sink drains and exits.
    let _ = sink.await;
    info!("relay server stopped");
    Ok(())
}

async fn print_events(mut events: mpsc::UnboundedReceiver<ServerEvent>) {
    while let Some(event) = events.recv().await {
        println!("[{}] {}", Local::now().format(TIMESTAMP_FORMAT), describe(&event));
    }
}

/// One console line per event.
pub fn describe(event: &ServerEvent) -> String {
    match event {
        ServerEvent::ClientConnected { id, peer } => format!("client {id} connected from {peer}"),
        ServerEvent::SnapshotStored {
            id,
            row_id,
            snapshot,
        } => {
            let ram = snapshot.memory();
            format!(
                "client {id}: {} ram {:.2}/{:.2} GB ({:.1}%), {} connections (row {row_id})",
                snapshot.timestamp_text(),
                ram.used(),
                ram.total(),
                ram.percent(),
                snapshot.connections().len(),
            )
        }
        ServerEvent::ParseFailed { id, reason } => {
            format!("client {id}: rejected payload: {reason}")
        }
        ServerEvent::AuthenticationFailed { id, error } => {
            format!("client {id}: dropped frame: {error}")
        }
        ServerEvent::PersistenceFailed { id, error } => {
            format!("client {id}: not stored: {error}")
        }
        ServerEvent::ClientDisconnected { id, stats } => format!(
            "client {id} disconnected after {:.0?} ({} frames, {} stored)",
            stats.age(),
            stats.frames,
            stats.stored,
        ),
        ServerEvent::EmergencyTriggered { silent_for, .. } => {
            format!("EMERGENCY: no client traffic for {}s", silent_for.as_secs())
        }
    }
}
