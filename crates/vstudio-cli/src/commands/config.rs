//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use vstudio_core::{Backend, Config};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "backend": config.backend,
                    "database": config.database,
                    "log_level": config.log_level,
                    "unique_indexes": config.unique_indexes,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.database_path().display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:       {}", config.data_dir.display());
            println!("  backend:        {}", config.backend);
            println!("  database:       {}", config.database);
            println!("  log_level:      {}", config.log_level);
            println!("  unique_indexes: {}", config.unique_indexes);
            if config.backend == Backend::Sqlite {
                println!();
                println!("Database file: {}", config.database_path().display());
            }
            println!("Config file:   {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    config.set(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
