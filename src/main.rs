use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "qcrun")]
#[command(version, about = "Hardware QC test station")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Station directory holding .qcrun/, logs and results (defaults to the current directory)
    #[arg(long, global = true)]
    pub station_dir: Option<PathBuf>,

    /// Path to station.toml. Overrides <station-dir>/.qcrun/station.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Test devices one after another
    Run {
        /// Only run these tests (comma-separated ids, e.g. T01,T09)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Skip these tests (comma-separated ids)
        #[arg(long, value_delimiter = ',')]
        skip: Vec<String>,

        /// Device id for the first session
        #[arg(long)]
        device_id: Option<String>,

        /// Hardware version recorded for the first session
        #[arg(long)]
        device_version: Option<String>,

        /// Manufacture id recorded for the first session
        #[arg(long)]
        manufacture_id: Option<String>,

        /// Answer confirmations and retry prompts with their defaults
        #[arg(long)]
        yes: bool,

        /// Remote host to run SSH checks against. Overrides station.toml
        #[arg(long)]
        host: Option<String>,
    },
    /// List the test catalog
    List,
    /// List archived sessions, most recent first
    Sessions {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show an archived session record
    Show { file: PathBuf },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default station.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let station_dir = match cli.station_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            only,
            skip,
            device_id,
            device_version,
            manufacture_id,
            yes,
            host,
        } => {
            let options = cmd::RunOptions {
                only: only.clone(),
                skip: skip.clone(),
                device_id: device_id.clone(),
                device_version: device_version.clone(),
                manufacture_id: manufacture_id.clone(),
                yes: *yes,
                host: host.clone(),
            };
            cmd::cmd_run(&cli, &station_dir, options).await?;
        }
        Commands::List => {
            let _guard = qcrun::logging::init(None, cli.verbose);
            cmd::cmd_list(&cli, &station_dir)?;
        }
        Commands::Sessions { limit } => {
            let _guard = qcrun::logging::init(None, cli.verbose);
            cmd::cmd_sessions(&cli, &station_dir, *limit)?;
        }
        Commands::Show { file } => {
            let _guard = qcrun::logging::init(None, cli.verbose);
            cmd::cmd_show(&cli, &station_dir, file)?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&cli, &station_dir, command.clone())?;
        }
    }

    Ok(())
}
