//! CLI entry point - the composition root.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fetcher_cli::{Cli, Commands, bootstrap, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config = cli.command {
        return handlers::config::execute(&cli.fetcher_config()?);
    }

    let ctx = bootstrap(&cli)?;
    let result = match cli.command {
        Commands::Get(args) => handlers::get::execute(&ctx, args).await,
        Commands::Upload(args) => handlers::upload::execute(&ctx, args).await,
        Commands::Status(args) => handlers::status::execute(&ctx, args).await,
        Commands::Config => Ok(()),
    };
    ctx.workstation.shutdown().await;
    result
}
