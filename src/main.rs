//! Reception serials - operator CLI
//!
//! Reads serial and part numbers from scanned pages, has the operator
//! validate them, and writes identifier lists, barcodes and feedback.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use reception_serials::cli;
use reception_serials::config::{self, AppConfig};
use reception_serials::storage;

/// Reception serials - OCR serial number validation
#[derive(Parser, Debug)]
#[command(name = "reception-serials")]
#[command(about = "Extract and validate serial and part numbers from scanned pages")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Review pages interactively and export the validated identifiers
    Review {
        /// Page images, in document order
        #[arg(required = true)]
        pages: Vec<PathBuf>,
    },
    /// Print candidates for each page as JSON, without validation
    Extract {
        /// Page images, in document order
        #[arg(required = true)]
        pages: Vec<PathBuf>,
    },
    /// Export recorded feedback as (ocr_text, corrected_text) CSV
    ExportFeedback {
        /// Destination CSV file
        #[arg(long)]
        csv: PathBuf,
    },
    /// Write the default configuration file
    InitConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match args.config {
        Some(path) => path,
        None => storage::get_config_dir()?.join("config.toml"),
    };

    match args.command {
        Commands::InitConfig => {
            cli::init_config(&config_path)?;
            println!("Configuration written to {}", config_path.display());
        }
        Commands::Extract { pages } => {
            let config = load_or_default_config(&config_path)?;
            let reports = cli::extract(&config, &pages)?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Review { pages } => {
            let config = load_or_default_config(&config_path)?;
            let stdin = std::io::stdin();
            let snapshot = cli::review(&config, &pages, stdin.lock(), std::io::stdout())?;
            info!(
                "Session {} finished: {} identifier(s) from {} page(s)",
                snapshot.session_id,
                snapshot.identifiers.len(),
                snapshot.pages.len()
            );
        }
        Commands::ExportFeedback { csv } => {
            let config = load_or_default_config(&config_path)?;
            let rows = cli::export_feedback(&config, &csv)?;
            println!("Exported {} row(s) to {}", rows, csv.display());
        }
    }

    Ok(())
}

/// Load configuration from file, or the defaults when there is none
fn load_or_default_config(path: &Path) -> Result<AppConfig> {
    let config = if path.exists() {
        let config = config::load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        info!("Loaded configuration from {:?}", path);
        config
    } else {
        info!("Using default configuration");
        AppConfig::default()
    };
    config.validate()?;
    Ok(config)
}
