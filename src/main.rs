//! CLI entry point for the roadway rater.
//!
//! Provides subcommands for the full scoring run, a reconcile-only run that
//! stops after the volume/crash merge, and printing the effective
//! configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roadway_rater::PipelineConfig;
use roadway_rater::pipeline;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "roadway_rater")]
#[command(about = "Scores roadway segments from traffic, crash and corridor data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage and write the scored dataset
    Run {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory for the scored dataset and side artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Gzip compress the scored dataset
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Load and reconcile volume and crash segments only
    Reconcile {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory for the reconciled grid and side artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON
    ShowConfig {
        /// Pipeline configuration (JSON); defaults are shown without one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: &Path, output_dir: Option<PathBuf>, gzip: bool) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    config.gzip |= gzip;
    Ok(config)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/roadway_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("roadway_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output_dir,
            gzip,
        } => {
            let config = load_config(&config, output_dir, gzip)?;
            let summary = pipeline::run(&config)?;
            info!(
                rows = summary.rows,
                output = %summary.output.display(),
                stages = summary.diagnostics.stages.len(),
                "Scored dataset written"
            );
        }
        Commands::Reconcile { config, output_dir } => {
            let config = load_config(&config, output_dir, false)?;
            let summary = pipeline::run_reconcile(&config)?;
            info!(
                rows = summary.rows,
                output = %summary.output.display(),
                "Reconciled grid written"
            );
        }
        Commands::ShowConfig { config } => {
            let config = match config {
                Some(path) => load_config(&path, None, false)?,
                None => PipelineConfig::default(),
            };
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
