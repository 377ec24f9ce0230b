//! Validation Studio CLI
//!
//! Command-line interface for Validation Studio - search and manage any
//! catalogued resource in the configured document store.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vstudio_core::{storage, Config, Resources, ServiceError};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "vstudio")]
#[command(about = "Validation Studio - document store for organisations, instruments and test sequences")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalogued resources and their key fields
    Resources,
    /// Search a resource
    #[command(alias = "ls")]
    Search {
        /// Resource name, e.g. organisations or sequences.steps
        resource: String,
        /// Parent document ID (embedded resources)
        #[arg(short, long)]
        parent: Option<String>,
        /// Equality filter as a JSON object
        #[arg(short, long)]
        filter: Option<String>,
        /// Projection as a JSON object, e.g. '{"password": 0}'
        #[arg(short, long)]
        unset: Option<String>,
    },
    /// Create a document
    #[command(alias = "add")]
    Create {
        /// Resource name
        resource: String,
        /// Document as a JSON object
        body: String,
        /// Parent document ID (embedded resources)
        #[arg(short, long)]
        parent: Option<String>,
        /// Insert position inside the parent's array (negative appends)
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        position: i64,
    },
    /// Partially update a document
    Update {
        /// Resource name
        resource: String,
        /// Document ID (sub-document ID for embedded resources)
        id: String,
        /// Fields to set as a JSON object
        body: String,
        /// Parent document ID (embedded resources)
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Delete a document
    #[command(alias = "rm")]
    Delete {
        /// Resource name
        resource: String,
        /// Document ID (sub-document ID for embedded resources)
        id: String,
        /// Parent document ID (embedded resources)
        #[arg(short, long)]
        parent: Option<String>,
        /// Soft delete, recording this user ID as the actor
        #[arg(long, value_name = "USER_ID")]
        soft_by: Option<String>,
    },
    /// Create store-level unique indexes for every top-level resource
    Indexes,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, backend, database, log_level, unique_indexes)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(cli, &output).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ServiceError>() {
                Some(service) => output.print_error(service),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    let config_path = cli.config.as_ref();

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config.log_level);
    debug!(backend = %config.backend, "Configuration loaded");

    let store = storage::open(&config)?;
    let resources = Resources::new(store.clone());

    match cli.command {
        Commands::Resources => commands::resource::list(output),
        Commands::Search {
            resource,
            parent,
            filter,
            unset,
        } => commands::resource::search(&resources, resource, parent, filter, unset, output).await,
        Commands::Create {
            resource,
            body,
            parent,
            position,
        } => commands::resource::create(&resources, resource, body, parent, position, output).await,
        Commands::Update {
            resource,
            id,
            body,
            parent,
        } => commands::resource::update(&resources, resource, id, body, parent, output).await,
        Commands::Delete {
            resource,
            id,
            parent,
            soft_by,
        } => commands::resource::delete(&resources, resource, id, parent, soft_by, output).await,
        Commands::Indexes => commands::indexes::ensure(store.as_ref(), output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Log to stderr so JSON on stdout stays clean. `RUST_LOG` wins over the
/// configured level.
fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("vstudio_core={},vstudio={}", log_level, log_level))
    });

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
