use anyhow::Result;
use board_common::MemberPermission;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "boardsync")]
#[command(version, about = "Real-time collaborative board sync relay and tools")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to boardsync.toml (defaults to ./boardsync.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the board channel relay
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable permissive CORS (local front-end dev server)
        #[arg(long)]
        dev: bool,
    },
    /// Follow a board's live channel and print what collaborators do
    Watch {
        board_id: String,

        /// Act as this owner id (defaults to the saved guest session)
        #[arg(long)]
        actor: Option<String>,
    },
    /// Encode, inspect or accept guest invite tokens
    Invite {
        #[command(subcommand)]
        command: InviteCommands,
    },
    /// View and manage configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum InviteCommands {
    /// Create an invite link for a board
    Encode {
        #[arg(long)]
        board_id: String,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        color: Option<String>,

        #[arg(long)]
        email: String,

        /// view, edit or admin
        #[arg(long, default_value = "view")]
        permission: MemberPermission,

        /// Origin for the link (overrides invite.origin)
        #[arg(long)]
        origin: Option<String>,
    },
    /// Decode a token or invite link
    Decode {
        token: String,

        /// Print the payload as JSON
        #[arg(long)]
        json: bool,
    },
    /// Accept an invite link and save the guest session
    Accept {
        link: String,

        /// Display name (defaults to the part of the email before '@')
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default boardsync.toml file
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(boardsync::config::CONFIG_FILE));

    match &cli.command {
        Commands::Serve { host, port, dev } => {
            cmd::cmd_serve(&config_path, host.clone(), *port, *dev).await?;
        }
        Commands::Watch { board_id, actor } => {
            cmd::cmd_watch(&config_path, board_id, actor.clone()).await?;
        }
        Commands::Invite { command } => cmd::cmd_invite(&config_path, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&config_path, command.clone())?,
    }

    Ok(())
}
