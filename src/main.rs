//! Arbor CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Multi-language static analyzer that persists a code property graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Configuration file (defaults to <root>/arbor.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project identifier embedded in every canonical id
    #[arg(short, long)]
    project_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the project tree and build its graph
    Index,
    /// Re-analyze a single file incrementally
    File {
        /// Path to the file, absolute or relative to the root
        path: PathBuf,
    },
    /// Clear the analysis cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("arbor={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Arbor v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Project root: {}", cli.root.display());

    match cli.command {
        Commands::Index => commands::index(cli.root, cli.config, cli.project_id).await,
        Commands::File { path } => {
            commands::file(cli.root, path, cli.config, cli.project_id).await
        }
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("Arbor v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
