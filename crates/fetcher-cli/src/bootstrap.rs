//! CLI bootstrap - the composition root.
//!
//! The only place where adapters are wired together for the CLI:
//! - Tiered cache store (via fetcher-store)
//! - Foreground and background HTTP sessions (via fetcher-http)
//! - Workstation (via fetcher-workstation)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use fetcher_core::{FetcherConfig, NoopTransferEmitter, SignatureValidator};
use fetcher_http::{HttpTransport, HttpTransportConfig, UploadMethod};
use fetcher_store::TieredCacheStore;
use fetcher_workstation::{Workstation, WorkstationDeps, build_workstation};

use crate::commands::Commands;
use crate::parser::Cli;

/// Fully composed context for CLI commands.
pub struct CliContext {
    pub workstation: Workstation,
    pub config: FetcherConfig,
    /// Resolved cache root.
    pub cache_dir: PathBuf,
}

/// Build the workstation for one CLI invocation.
///
/// Must be called inside a Tokio runtime; the HTTP sessions capture it.
pub fn bootstrap(cli: &Cli) -> Result<CliContext> {
    let config = cli.fetcher_config()?;
    let cache_dir = config.resolved_cache_dir()?;

    // Partial downloads live next to the cache so the final rename stays on
    // one filesystem.
    let download_dir = cache_dir.join("tmp");
    std::fs::create_dir_all(&download_dir)
        .with_context(|| format!("creating {}", download_dir.display()))?;

    let upload_method = match &cli.command {
        Commands::Upload(args) if args.put => UploadMethod::Put,
        _ => UploadMethod::Post,
    };

    let foreground = HttpTransport::new(
        HttpTransportConfig::foreground()
            .with_download_dir(&download_dir)
            .with_upload_method(upload_method),
    )?;
    let background = HttpTransport::new(
        HttpTransportConfig::background()
            .with_download_dir(&download_dir)
            .with_upload_method(upload_method),
    )?;

    let workstation = build_workstation(WorkstationDeps {
        cache: Arc::new(TieredCacheStore::from_config(&config)?),
        foreground: Arc::new(foreground),
        background: Arc::new(background),
        event_emitter: Arc::new(NoopTransferEmitter),
        validator: Arc::new(SignatureValidator::new()),
        config: config.clone(),
    });
    workstation.start()?;

    tracing::debug!(
        target: "fetcher.cli",
        cache_dir = %cache_dir.display(),
        workers = config.interactive_workers,
        "Workstation ready"
    );

    Ok(CliContext {
        workstation,
        config,
        cache_dir,
    })
}
