//! VaultKV CLI
//!
//! Operator tool for inspecting and editing a store file directly.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use vaultkv::{Config, Engine};

/// VaultKV CLI
#[derive(Parser, Debug)]
#[command(name = "vaultkv-cli")]
#[command(about = "CLI for VaultKV store files")]
#[command(version)]
struct Args {
    /// Backing file of the store
    #[arg(short, long, default_value = "./vaultkv.db")]
    path: PathBuf,

    /// Encryption secret (enables the encrypted format)
    #[arg(short, long)]
    key: Option<String>,

    /// Compare keys ignoring case
    #[arg(short, long)]
    ignore_case: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set (stored as UTF-8 bytes)
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List all keys
    List,

    /// Print the number of entries
    Count,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vaultkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = Config::builder()
        .path(&args.path)
        .ignore_case(args.ignore_case);
    if let Some(key) = args.key {
        builder = builder.encryption_key(key);
    }

    let engine = match Engine::open(builder.build()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = run(&engine, args.command);

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close store: {}", e);
        return ExitCode::FAILURE;
    }
    code
}

fn run(engine: &Engine, command: Commands) -> ExitCode {
    match command {
        Commands::Get { key } => match engine.get(&key) {
            Some(value) => {
                println!("{}", String::from_utf8_lossy(&value));
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("(nil)");
                ExitCode::FAILURE
            }
        },
        Commands::Set { key, value } => {
            engine.upsert(key, value.into_bytes());
            println!("OK");
            ExitCode::SUCCESS
        }
        Commands::Del { key } => {
            let removed = engine.remove(&key);
            println!("{}", u8::from(removed));
            ExitCode::SUCCESS
        }
        Commands::List => {
            let mut keys = engine.keys();
            keys.sort_unstable();
            for key in keys {
                println!("{}", key);
            }
            ExitCode::SUCCESS
        }
        Commands::Count => {
            println!("{}", engine.count());
            ExitCode::SUCCESS
        }
    }
}
