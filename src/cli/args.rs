//! CLI argument definitions using clap derive

use crate::atc::{Params, Source, Version, VersionedResourceTypes};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// resfetch - fetch and cache CI resources in containers
///
/// Runs resource check/in/out scripts and build tasks with rootless
/// Podman, caching fetched versions as reusable volumes.
#[derive(Parser, Debug)]
#[command(name = "resfetch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "RESFETCH_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a resource version into a cached volume
    Fetch(FetchArgs),

    /// Publish a resource and print the resulting version
    Put(PutArgs),

    /// List versions of a resource
    Check(CheckArgs),

    /// Run a build task in a container
    Task(TaskArgs),

    /// Inspect the resource cache store
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Resource identity shared by fetch, put and check
#[derive(Parser, Debug)]
pub struct ResourceArgs {
    /// Resource type (base type or a declared custom type)
    #[arg(short = 't', long = "type")]
    pub resource_type: String,

    /// Source configuration as a JSON object
    #[arg(short, long, value_parser = parse_json::<Source>)]
    pub source: Source,

    /// Custom resource types as a JSON array
    #[arg(long, value_parser = parse_json::<VersionedResourceTypes>)]
    pub resource_types: Option<VersionedResourceTypes>,

    /// Team the step runs for
    #[arg(long, default_value = "1")]
    pub team_id: i64,
}

/// Build step a container belongs to
#[derive(Parser, Debug)]
pub struct StepArgs {
    /// Build id of the step
    #[arg(long, default_value = "1")]
    pub build_id: i64,

    /// Plan id of the step within the build
    #[arg(long, default_value = "cli")]
    pub plan_id: String,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    #[command(flatten)]
    pub step: StepArgs,

    /// Version to fetch as a JSON object (defaults to the latest)
    #[arg(long, value_parser = parse_json::<Version>)]
    pub version: Option<Version>,

    /// Get params as a JSON object
    #[arg(short, long, value_parser = parse_json::<Params>)]
    pub params: Option<Params>,
}

/// Arguments for the put command
#[derive(Parser, Debug)]
pub struct PutArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    #[command(flatten)]
    pub step: StepArgs,

    /// Put params as a JSON object
    #[arg(short, long, value_parser = parse_json::<Params>)]
    pub params: Option<Params>,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    /// Check from this version as a JSON object
    #[arg(long, value_parser = parse_json::<Version>)]
    pub version: Option<Version>,

    /// Resource config the check container is scoped to
    #[arg(long, default_value = "1")]
    pub resource_config_id: i64,
}

/// Arguments for the task command
#[derive(Parser, Debug)]
pub struct TaskArgs {
    /// Task config file (TOML, or JSON with a .json extension)
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    #[command(flatten)]
    pub step: StepArgs,

    /// Team the task runs for
    #[arg(long, default_value = "1")]
    pub team_id: i64,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List resource caches
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Parse a JSON command line value
fn parse_json<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON '{s}': {e}"))
}
