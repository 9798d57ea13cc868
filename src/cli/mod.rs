//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod serve;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use evogate::config::Config;

#[derive(Parser)]
#[command(name = "evogate")]
#[command(version)]
#[command(
    about = "Evolution API compatible gateway for a WhatsApp Web session",
    long_about = None
)]
struct Cli {
    /// Config file (default: $EVOGATE_CONFIG or ~/.evogate/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway and the WhatsApp session
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Check configuration for errors and warnings
    Check,
    /// Write a default config with a freshly generated API key
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration (API key masked)
    Show,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::path);

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Serve { host, port }) => {
            serve::cmd_serve(&config_path, host, port).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action, &config_path)?;
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("evogate {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Evolution API compatible WhatsApp Web gateway");
}
