use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "indice",
    version,
    about = "Supermarket CPI tracker: official INDEC sync, tracker index, publication runs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,

    /// tracing filter directive (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample config file
    Init(InitArgs),
    /// Fetch and store the official CPI series
    Sync(SyncArgs),
    /// Build the tracker index from stored observations
    Build(BuildArgs),
    /// Sync, build, compare and record a publication run
    Publish(PublishArgs),
    /// List recent publication runs
    Runs(RunsArgs),
    /// Load price observations from a CSV file
    Ingest(IngestArgs),
    Version,
}

#[derive(clap::Args, Clone)]
pub struct ConfigArgs {
    #[arg(long, default_value = "indice.yaml", env = "INDICE_CONFIG")]
    pub config: PathBuf,

    /// overrides storage.database_path
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(clap::Args, Clone)]
pub struct WindowArgs {
    /// first month, YYYY-MM
    #[arg(long)]
    pub from: Option<String>,
    /// last month, YYYY-MM
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "indice.yaml")]
    pub config: PathBuf,
}

#[derive(Parser, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub cfg: ConfigArgs,
    #[command(flatten)]
    pub window: WindowArgs,
    /// region or "all"
    #[arg(long, default_value = "all")]
    pub region: String,
    /// print the sync result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub cfg: ConfigArgs,
    #[command(flatten)]
    pub window: WindowArgs,
    /// cba | extended | all
    #[arg(long, default_value = "cba")]
    pub basket: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct PublishArgs {
    #[command(flatten)]
    pub cfg: ConfigArgs,
    #[command(flatten)]
    pub window: WindowArgs,
    #[arg(long, default_value = "cba")]
    pub basket: String,
    /// comparison region (defaults to official.region_default)
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub skip_sync: bool,
    #[arg(long)]
    pub skip_build: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Clone)]
pub struct RunsArgs {
    #[command(flatten)]
    pub cfg: ConfigArgs,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    /// show a single run by uuid
    #[arg(long)]
    pub run: Option<String>,
}

#[derive(Parser, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub cfg: ConfigArgs,
    /// CSV with canonical_id, basket_id, price, observed_at and optional category
    pub file: PathBuf,
}
