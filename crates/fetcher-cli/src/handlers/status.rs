//! Status command handler.

use anyhow::Result;

use fetcher_core::FetchStatus;

use crate::bootstrap::CliContext;
use crate::commands::StatusArgs;

pub async fn execute(ctx: &CliContext, args: StatusArgs) -> Result<()> {
    let status = ctx.workstation.status(&args.url, args.format).await;
    match &status {
        FetchStatus::Missing => println!("{}: not cached", args.url),
        FetchStatus::Cached => println!("{}: cached", args.url),
        FetchStatus::Fetching { transfer } => {
            println!("{}", serde_json::to_string_pretty(transfer)?);
        }
    }
    Ok(())
}
