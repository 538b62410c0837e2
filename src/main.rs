use anyhow::Result;
use clap::{Parser, Subcommand};
use geochat_cli::config::{Config, MethodPreference};
use geochat_cli::transport;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "geochat")]
#[command(author, about = "Geochat - location-aware agent chat CLI", long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), env!("GEOCHAT_VERSION_SUFFIX")))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the per-user one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show location attempts and the full message sent to the agent
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent; each message carries your current location
    Chat {
        /// Send a single message and exit
        message: Option<String>,

        /// Location method to try first (amap, ip)
        #[arg(short, long)]
        method: Option<MethodPreference>,
    },

    /// Resolve and print the current location
    Locate {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Location method to try first (amap, ip)
        #[arg(short, long)]
        method: Option<MethodPreference>,
    },

    /// Show public IP, geolocation details and local network information
    Diagnose,

    /// Package a device id and count as a JSON record
    Record {
        /// Device identifier
        #[arg(short, long)]
        device_id: String,

        /// Count, as base-10 integer text
        #[arg(short, long, allow_hyphen_values = true)]
        total: String,
    },

    /// Check the agent token and show bot info and shortcut commands
    Bot,
}

fn load_config(path: Option<&Path>, debug: bool) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if debug {
        config.debug = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "geochat_cli=debug,geochat=debug"
    } else {
        "geochat_cli=info,geochat=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Chat { message, method } => {
            let mut config = load_config(config_path, cli.debug)?;
            if let Some(method) = method {
                config.location.method = method;
            }
            tracing::debug!("Location method: {}", config.location.method.as_str());
            transport::cli::run_chat(&config, message).await?;
        }
        Commands::Locate { json, method } => {
            let mut config = load_config(config_path, cli.debug)?;
            if let Some(method) = method {
                config.location.method = method;
            }
            transport::cli::run_locate(&config, json).await?;
        }
        Commands::Diagnose => {
            let config = load_config(config_path, cli.debug)?;
            transport::cli::run_diagnose(&config).await?;
        }
        Commands::Record { device_id, total } => {
            transport::cli::run_record(&device_id, &total)?;
        }
        Commands::Bot => {
            let config = load_config(config_path, cli.debug)?;
            transport::cli::run_bot(&config).await?;
        }
    }

    Ok(())
}
