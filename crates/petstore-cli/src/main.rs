//! # petstore-cli
//!
//! Command-line interface for the Petstore MCP client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use petstore_core::ClientConfig;

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: ClientConfig,
}

/// Petstore - drive the Petstore tool server from the command line
#[derive(Parser)]
#[command(name = "petstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (merged over the user and project config)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an agent task against the tool server
    Task {
        /// Task name (find_pets, manage_pet, process_order, manage_user, store_summary)
        name: String,
        /// Task argument; the value is parsed as JSON when possible
        #[arg(short, long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
        /// Task arguments as one JSON object
        #[arg(long, value_name = "OBJECT")]
        json: Option<String>,
    },
    /// Render a prompt template
    Prompt {
        /// Template name
        name: String,
        /// Template variable; the value is parsed as JSON when possible
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
    /// Show a sampling preset, or list presets
    Sampling {
        /// Preset name
        preset: Option<String>,
    },
    /// List the tools the server exposes
    Tools,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = ClientConfig::load(cli.config.as_deref());

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        let level = loaded
            .as_ref()
            .map(|c| c.log_level.as_filter())
            .unwrap_or("info");
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = loaded.map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    let ctx = AppContext { config };

    match cli.command {
        Commands::Task { name, args, json } => {
            commands::task::run(&ctx, &name, &args, json.as_deref()).await?;
        }
        Commands::Prompt { name, vars } => {
            commands::prompt::run(&name, &vars)?;
        }
        Commands::Sampling { preset } => {
            commands::sampling::run(preset.as_deref())?;
        }
        Commands::Tools => {
            commands::tools::run(&ctx).await?;
        }
        Commands::Config { action } => {
            commands::config::handle(action, &ctx)?;
        }
    }

    Ok(())
}
