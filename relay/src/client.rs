//! `relay client`: collector, session and console sink.
//!
//! Reads commands from stdin while running: `r` reconnects, `q` quits.

use std::time::Duration;

use chrono::Local;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use telemetry_relay::client::{SessionEvent, TelemetryClient, TelemetryClientBuilder};
use telemetry_relay::core::{DEFAULT_SERVER_URL, TIMESTAMP_FORMAT};
use telemetry_relay::snapshot::SystemCollector;
use telemetry_relay::{Codec, RelayError};

use crate::settings::KeyArgs;

/// Send snapshots of this host to a relay server.
#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server URL, tcp://host:port or host:port.
    #[arg(long, default_value = DEFAULT_SERVER_URL, env = "RELAY_SERVER_URL")]
    pub server_url: String,

    /// Seconds between snapshots.
    #[arg(long, default_value = "2", value_name = "SECS")]
    pub interval: u64,

    /// Seconds to wait before reconnecting after a failure.
    #[arg(long, default_value = "5", value_name = "SECS")]
    pub backoff: u64,

    /// Seconds to wait for each acknowledgement.
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub reply_timeout: u64,

    /// Root of the proc filesystem to read connections from.
    #[arg(long, default_value = "/proc", value_name = "PATH")]
    pub proc_path: String,

    #[command(flatten)]
    pub key: KeyArgs,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Reconnect,
    Quit,
    Help,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "" => None,
        "r" | "reconnect" => Some(Command::Reconnect),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => Some(Command::Help),
    }
}

/// Run the client until `q`, end of input, or Ctrl-C.
pub async fn run(args: ClientArgs) -> Result<(), RelayError> {
    let key = args.key.load()?;
    let config = TelemetryClientBuilder::new()
        .server_url(args.server_url.clone())
        .collect_interval(Duration::from_secs(args.interval.max(1)))
        .backoff(Duration::from_secs(args.backoff))
        .reply_timeout(Duration::from_secs(args.reply_timeout.max(1)))
        .build();
    let collector = SystemCollector::new().with_proc_root(&args.proc_path);

    let (client, mut events) = TelemetryClient::spawn(config, collector, Codec::new(key))
        .map_err(|e| RelayError::Config(e.to_string()))?;
    info!(server = %args.server_url, "relay client started");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("[{}] {}", Local::now().format(TIMESTAMP_FORMAT), describe(&event)),
                None => break,
            },

            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(Command::Reconnect) => {
                        println!("reconnecting to {}", args.server_url);
                        if client.reconnect().is_err() {
                            break;
                        }
                    }
                    Some(Command::Quit) => break,
                    Some(Command::Help) => println!("commands: r = reconnect, q = quit"),
                    None => {}
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!(error = %e, "stdin unreadable; commands disabled");
                    stdin_open = false;
                }
            },

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await;
    info!("relay client stopped");
    Ok(())
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::ConnectionStatus(true) => "[STATUS] connected".to_string(),
        SessionEvent::ConnectionStatus(false) => "[STATUS] disconnected".to_string(),
        SessionEvent::MessageReceived(text) => format!("[MESSAGE] {text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(" r \n"), Some(Command::Reconnect));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
        assert_eq!(parse_command("what"), Some(Command::Help));
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe(&SessionEvent::ConnectionStatus(true)),
            "[STATUS] connected"
        );
        assert_eq!(
            describe(&SessionEvent::MessageReceived("received".into())),
            "[MESSAGE] received"
        );
    }
}
