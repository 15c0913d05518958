//! relay - encrypted telemetry relay.
//!
//! `relay server` accepts snapshots and stores them in SQLite.
//! `relay client` collects snapshots from this host and pushes them to a server.

mod client;
mod server;
mod settings;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;

use crate::client::ClientArgs;
use crate::server::ServerArgs;

/// Encrypted telemetry relay.
#[derive(Parser)]
#[command(name = "relay", about = "Encrypted telemetry relay", version)]
struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept snapshots from clients and store them.
    Server(ServerArgs),
    /// Send snapshots of this host to a server.
    Client(ClientArgs),
}

/// Initializes the tracing subscriber with the appropriate log level.
/// `RUST_LOG` takes precedence over the flags.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("relay={level},telemetry_relay={level}")));

    // Logs go to stderr; stdout carries the event console.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Server(args) => server::run(args).await,
        Command::Client(args) => client::run(args).await,
    };

    if let Err(e) = result {
        error!("{e}");
        eprintln!("relay: {e}");
        std::process::exit(1);
    }
}
