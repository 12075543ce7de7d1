use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod demo;
pub mod version;

use config::{default_config_path, default_store_path, LoggingConfig, ZkmpaConfig};

#[derive(Parser)]
#[command(name = "zkmpa")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Anonymous threshold approval for verifiable credentials", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Path to config file (default: ~/.local/share/zkmpa/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Run an end-to-end approval, issuance and verification with test doubles
    Demo {
        /// Path to config file (defaults apply if it does not exist)
        #[arg(long)]
        config: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Init { config, force } => {
            let path = config
                .map(PathBuf::from)
                .unwrap_or_else(default_config_path);
            init(&path, force)
        }
        Commands::Demo { config } => {
            let path = config
                .map(PathBuf::from)
                .unwrap_or_else(default_config_path);
            let config = ZkmpaConfig::load_or_default(&path)?;
            init_logging(&config.logging)?;
            demo::execute(config).await
        }
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

fn init(path: &std::path::Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }
    ZkmpaConfig::create_default(path, &default_store_path())?;
    println!("Created: {}", path.display());
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| format!("Invalid log level '{}': {}", logging.level, e))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    // A second init (e.g. in tests) keeps the first subscriber
    if let Err(e) = installed {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
    Ok(())
}
