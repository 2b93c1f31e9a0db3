//! Skein session data inspector.
//!
//! # Usage
//!
//! ```bash
//! # List stored sessions and their staged ephemeral payloads
//! skein-inspect --data-dir ./skein-data sessions
//!
//! # Show the payload staged for one room
//! skein-inspect ephemeral --session <id> --room '!room:example.org'
//!
//! # Discard a session's staged payloads
//! skein-inspect wipe --session <id>
//! ```

use std::io::Write;

use clap::{Parser, Subcommand};
use skein_client::{CredentialStore, FileCredentials, SessionConfig};
use skein_core::EphemeralBuffer;
use skein_proto::{RoomId, SessionId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Skein session data inspector
#[derive(Parser, Debug)]
#[command(name = "skein-inspect")]
#[command(about = "Inspect Skein session data on disk")]
#[command(version)]
struct Args {
    /// Root data directory
    #[arg(short, long, default_value = "skein-data")]
    data_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List sessions with stored credentials
    Sessions,

    /// Decode the ephemeral payload staged for a room
    Ephemeral {
        /// Session id
        #[arg(short, long)]
        session: String,

        /// Room id
        #[arg(short, long)]
        room: String,
    },

    /// Discard every staged payload of a session
    Wipe {
        /// Session id
        #[arg(short, long)]
        session: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    let config = SessionConfig::default().with_data_dir(&args.data_dir);
    let mut out = std::io::stdout().lock();

    match args.command {
        Command::Sessions => {
            let credentials = FileCredentials::new(&config.data_dir);
            let ids = credentials.session_ids()?;
            if ids.is_empty() {
                writeln!(out, "no sessions under {}", config.data_dir.display())?;
            }
            for id in ids {
                let Some(params) = credentials.load(&id)? else { continue };
                let pending = EphemeralBuffer::open(config.ephemeral_dir(&id))?.pending_count()?;
                writeln!(
                    out,
                    "{id}  {}  device={}  homeserver={}  staged={pending}",
                    params.user_id, params.device_id, params.homeserver
                )?;
            }
        },

        Command::Ephemeral { session, room } => {
            let session = SessionId::new(session);
            let room = RoomId::new(room);
            let buffer = EphemeralBuffer::open(config.ephemeral_dir(&session))?;
            match buffer.read(&room) {
                Some(payload) => {
                    writeln!(out, "typing: {}", payload.typing.len())?;
                    for user in &payload.typing {
                        writeln!(out, "  {user}")?;
                    }
                    writeln!(out, "receipts: {}", payload.receipts.len())?;
                    for receipt in &payload.receipts {
                        writeln!(
                            out,
                            "  {} read {} at {}",
                            receipt.user_id, receipt.event_id, receipt.timestamp_ms
                        )?;
                    }
                },
                None => writeln!(out, "nothing staged for {room}")?,
            }
        },

        Command::Wipe { session } => {
            let session = SessionId::new(session);
            let buffer = EphemeralBuffer::open(config.ephemeral_dir(&session))?;
            let pending = buffer.pending_count()?;
            buffer.reset()?;
            tracing::info!(session_id = %session, discarded = pending, "ephemeral buffer wiped");
            writeln!(out, "discarded {pending} staged payloads")?;
        },
    }

    Ok(())
}
