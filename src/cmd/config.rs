//! Configuration view and validation commands: `qcrun config`.

use anyhow::Result;
use std::path::Path;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, station_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    use qcrun::config::{StationConfig, StationToml};

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| StationConfig::default_config_path(station_dir));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Station Configuration");
            println!("=====================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No station.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let config = StationConfig::load(station_dir, cli.config.as_deref())?;
            let toml = &config.toml;

            if let Some(catalog) = config.catalog_file() {
                println!("catalog_file = \"{}\"", catalog.display());
                println!();
            }

            println!("[remote]");
            println!("  target = \"{}\" (port {})", toml.remote.target(), toml.remote.port);
            println!("  ssh_cmd = \"{}\"", toml.remote.ssh_cmd);
            if !toml.remote.options.is_empty() {
                println!("  options = {:?}", toml.remote.options);
            }
            println!("  connect_timeout_secs = {}", toml.remote.connect_timeout_secs);
            println!("  command_timeout_secs = {}", toml.remote.command_timeout_secs);
            println!("  shutdown_command = \"{}\"", toml.remote.shutdown_command);
            println!();

            println!("[retry]");
            println!("  remote_max_attempts = {}", toml.retry.remote_max_attempts);
            println!();

            println!("[firmware]");
            println!("  uf2_dir = \"{}\"", config.uf2_dir().display());
            println!("  files_dir = \"{}\"", config.files_dir().display());
            println!("  uart_glob = \"{}\"", toml.firmware.uart_glob);
            println!("  files = {} file(s)", toml.firmware.files.len());
            println!();

            println!("[output]");
            println!("  log_dir = \"{}\"", config.log_dir().display());
            println!("  sessions_dir = \"{}\"", config.sessions_dir().display());
            println!("  results_csv = \"{}\"", config.results_csv().display());
            println!("  results_xlsx = \"{}\"", config.results_xlsx().display());
            println!();

            if !config_path.exists() {
                println!("Run 'qcrun config init' to create a station.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No station.toml found. Using defaults (valid).");
                return Ok(());
            }

            let config = StationConfig::load(station_dir, cli.config.as_deref())?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("station.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            StationToml::default().save(&config_path)?;

            println!("Created station.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [remote] host, user, command_timeout_secs");
            println!("  - [retry] remote_max_attempts");
            println!("  - [firmware] volume_paths, uart_glob, files");
            println!("  - [output] log_dir, sessions_dir, results_csv, results_xlsx");
            println!();
        }
    }

    Ok(())
}
