//! CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use url::Url;

use fetcher_core::{CachePolicy, PersistenceTier, ResourceFormat};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one or more resources, from the cache when possible
    Get(GetArgs),
    /// Upload a file and print the server response
    Upload(UploadArgs),
    /// Show whether a resource is cached
    Status(StatusArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Resource URLs (duplicates share one transfer)
    #[arg(required = true)]
    pub urls: Vec<Url>,

    /// Resource format used for the cache key and validation
    #[arg(short, long, default_value = "file", value_parser = parse_format)]
    pub format: ResourceFormat,

    /// Cache policy
    #[arg(short, long, value_enum, default_value_t = PolicyArg::CacheFirst)]
    pub policy: PolicyArg,

    /// Persistence tier for newly fetched results
    #[arg(short, long, value_parser = parse_tier)]
    pub tier: Option<PersistenceTier>,

    /// Run the transfers on the background session
    #[arg(long)]
    pub background: bool,

    /// Copy each payload into this directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Destination URL
    pub url: Url,

    /// File to send as the request body
    pub file: PathBuf,

    /// Use PUT instead of POST
    #[arg(long)]
    pub put: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Resource URL
    pub url: Url,

    /// Resource format used for the cache key
    #[arg(short, long, default_value = "file", value_parser = parse_format)]
    pub format: ResourceFormat,
}

/// Command-line spelling of [`CachePolicy`].
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    CacheFirst,
    CacheOnly,
    NetworkOnly,
}

impl From<PolicyArg> for CachePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::CacheFirst => Self::CacheFirst,
            PolicyArg::CacheOnly => Self::CacheOnly,
            PolicyArg::NetworkOnly => Self::NetworkOnly,
        }
    }
}

pub fn parse_format(s: &str) -> Result<ResourceFormat, String> {
    ResourceFormat::parse(s).ok_or_else(|| format!("unknown format '{s}' (image, audio, video, file)"))
}

pub fn parse_tier(s: &str) -> Result<PersistenceTier, String> {
    PersistenceTier::parse(s).ok_or_else(|| format!("unknown tier '{s}' (memory, durable)"))
}
