//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use fetcher_core::{ConfigError, FetcherConfig, PersistenceTier};

use crate::commands::{Commands, parse_tier};

/// Fetch remote resources through a deduplicating, caching workstation.
#[derive(Parser, Debug)]
#[command(name = "fetcher")]
#[command(about = "Fetch and cache remote resources")]
#[command(version)]
pub struct Cli {
    /// Cache directory (defaults to the platform cache dir)
    #[arg(long = "cache-dir", global = true, env = "FETCHER_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Concurrent cache lookups and completion pipelines
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Persistence tier used when a command does not name one
    #[arg(long = "default-tier", global = true, value_parser = parse_tier)]
    pub default_tier: Option<PersistenceTier>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn fetcher_config(&self) -> Result<FetcherConfig, ConfigError> {
        let mut config = FetcherConfig::from_env()?;
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir.clone());
        }
        if let Some(workers) = self.workers {
            config = config.with_interactive_workers(workers);
        }
        if let Some(tier) = self.default_tier {
            config = config.with_default_tier(tier);
        }
        Ok(config)
    }
}
