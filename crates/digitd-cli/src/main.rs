//! digitd CLI
//!
//! Command-line interface for interacting with the digitd daemon.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// digitctl - client for the digitd prediction server
#[derive(Parser, Debug)]
#[command(name = "digitctl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(long, default_value = "http://localhost:8000", global = true)]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify the digit drawn in an image file
    Predict {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,

        /// Identifier echoed back by the server
        #[arg(long)]
        model_id: Option<String>,
    },

    /// List registered models
    Models,

    /// Register a serialized model
    Register {
        /// Model artifact file; omit to register metadata only
        artifact: Option<PathBuf>,

        /// Algorithm name (e.g. logistic_regression, cnn)
        #[arg(long)]
        algorithm: String,

        /// Format tag (pickle, h5, keras, onnx)
        #[arg(long)]
        format: String,

        /// Make this the active model
        #[arg(long)]
        active: bool,

        /// Human-readable name
        #[arg(long)]
        name: Option<String>,
    },

    /// Show server health
    Health,

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = commands::ApiClient::new(&cli.api);

    match cli.command {
        Commands::Predict { image, model_id } => {
            commands::predict(&client, &image, model_id).await?;
        }
        Commands::Models => {
            commands::models(&client).await?;
        }
        Commands::Register {
            artifact,
            algorithm,
            format,
            active,
            name,
        } => {
            commands::register(&client, artifact.as_deref(), algorithm, format, active, name)
                .await?;
        }
        Commands::Health => {
            commands::health(&client).await?;
        }
        Commands::Status => {
            commands::status(&client).await?;
        }
    }

    Ok(())
}
