use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "portico",
    version,
    about = "Runtime cache policy for the Portico network proxy"
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print or validate the proxy manifest
    Manifest(ManifestArgs),
    /// Show which cache rule a request would use
    Route(RouteArgs),
    /// Fetch a URL through the cache policy engine
    Fetch(FetchArgs),
    /// Inspect or clear persisted partitions
    Cache(CacheArgs),
}

/// Manifest source shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ManifestSource {
    /// Manifest file (JSON, or YAML by extension). Defaults to PORTICO_MANIFEST,
    /// then the built-in manifest.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Args, Debug)]
pub struct ManifestArgs {
    #[command(flatten)]
    pub source: ManifestSource,

    /// Output format
    #[arg(long, short, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Validate only; print a one-line summary
    #[arg(long)]
    pub check: bool,
}

#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Request URL
    pub url: String,

    /// Request method
    #[arg(long, short = 'X', default_value = "GET")]
    pub method: String,

    /// Print the decision as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub source: ManifestSource,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Request URL
    pub url: String,

    /// Request header, `Name: value` (repeatable)
    #[arg(long = "header", short = 'H')]
    pub headers: Vec<String>,

    /// Write the response body to stdout
    #[arg(long)]
    pub body: bool,

    /// Partition directory (default: PORTICO_CACHE_DIR or the user cache dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[command(flatten)]
    pub source: ManifestSource,
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub cmd: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List persisted partitions of the current revision
    Stats(CacheStatsArgs),
    /// Remove persisted partitions of the current revision
    Clear(CacheStoreArgs),
}

#[derive(Args, Debug)]
pub struct CacheStoreArgs {
    /// Partition directory (default: PORTICO_CACHE_DIR or the user cache dir)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[command(flatten)]
    pub source: ManifestSource,
}

#[derive(Args, Debug)]
pub struct CacheStatsArgs {
    #[command(flatten)]
    pub store: CacheStoreArgs,

    /// Drop expired entries before reporting
    #[arg(long)]
    pub sweep: bool,

    /// Print stats as JSON
    #[arg(long)]
    pub json: bool,
}
