//! relay-keygen - generate a pre-shared key for the relay.

use std::path::PathBuf;

use clap::Parser;
use telemetry_relay::PresharedKey;

/// Generate a fresh pre-shared key.
#[derive(Parser)]
#[command(name = "relay-keygen", about = "Generate a relay pre-shared key", version)]
struct Args {
    /// Also write the key to this file (refuses to overwrite).
    #[arg(short, long, value_name = "PATH")]
    out: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    let key = PresharedKey::generate().to_base64();

    if let Some(path) = &args.out {
        let written = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .and_then(|mut file| std::io::Write::write_all(&mut file, format!("{key}\n").as_bytes()));
        if let Err(e) = written {
            eprintln!("relay-keygen: cannot write {}: {e}", path.display());
            std::process::exit(1);
        }
        println!("# key written to {}", path.display());
        println!("RELAY_KEY_FILE={}", path.display());
    } else {
        println!("{key}");
        println!();
        println!("# use it on both ends:");
        println!("RELAY_KEY={key}");
    }
}
