//! smscp CLI - notes you text to yourself

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use smscp_core::config::Backend;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{dashboard, gdpr, hook, init, migrate, note, user};

/// smscp - notes you text to yourself
#[derive(Parser)]
#[command(name = "smscp", version, about, long_about = None)]
struct Cli {
    /// Data directory (defaults to $SMSCP_DIR or ~/.smscp)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// User token from 'smscp user login'
    #[arg(long, global = true, env = "SMSCP_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write settings for a data directory
    Init {
        /// Storage backend (relational or document)
        #[arg(long)]
        backend: Option<Backend>,
        /// Base URL that password reset tokens are appended to
        #[arg(long)]
        reset_url: Option<String>,
        /// Token signing secret (prompted when missing)
        #[arg(long, env = "SMSCP_TOKEN_SECRET", hide_env_values = true)]
        token_secret: Option<String>,
        /// Migration key (prompted when missing)
        #[arg(long, env = "SMSCP_MIGRATION_KEY", hide_env_values = true)]
        migration_key: Option<String>,
    },

    /// Provision or upgrade storage
    Migrate {
        /// Migration key (prompted when missing)
        #[arg(long)]
        key: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage your account
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// Post and read notes
    Note {
        #[command(subcommand)]
        command: note::NoteCommands,
    },

    /// Show recent notes
    Dashboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export or delete all of your data
    Gdpr {
        #[command(subcommand)]
        command: gdpr::GdprCommands,
    },

    /// Deliver an inbound SMS
    Hook {
        /// Sender phone number
        #[arg(long)]
        from: String,
        /// Message body
        body: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Warnings by default, plus undelivered messages so local installs see them
const DEFAULT_LOG_FILTER: &str = "warn,smscp_core::adapters::notifier=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SMSCP_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let data_dir = commands::get_data_dir(cli.data_dir.as_deref())?;
    let token = cli.token.as_deref();

    match cli.command {
        Commands::Init { backend, reset_url, token_secret, migration_key } => {
            init::run(&data_dir, backend, reset_url, token_secret, migration_key)
        }
        Commands::Migrate { key, json } => migrate::run(&data_dir, key, json),
        Commands::User { command } => user::run(&data_dir, token, command),
        Commands::Note { command } => note::run(&data_dir, token, command),
        Commands::Dashboard { json } => dashboard::run(&data_dir, token, json),
        Commands::Gdpr { command } => gdpr::run(&data_dir, token, command),
        Commands::Hook { from, body, json } => hook::run(&data_dir, &from, &body, json),
    }
}
