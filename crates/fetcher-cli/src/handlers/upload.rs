//! Upload command handler.

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;

use fetcher_core::{CachePolicy, CorrelationToken};
use fetcher_workstation::FetchRequest;

use crate::bootstrap::CliContext;
use crate::commands::UploadArgs;
use crate::presentation::ProgressBoard;

/// Send the file and print the server's response body.
pub async fn execute(ctx: &CliContext, args: UploadArgs) -> Result<()> {
    let body = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;

    let (board, mut results) = ProgressBoard::new();
    let request = FetchRequest::new(args.url.clone(), CorrelationToken::new())
        .with_policy(CachePolicy::NetworkOnly);
    ctx.workstation
        .upload(request, Bytes::from(body), board.listener(&args.url));

    let (_, result) = results
        .recv()
        .await
        .ok_or_else(|| anyhow!("upload listener dropped"))?;
    let output = result?;
    println!("{}", String::from_utf8_lossy(&output.artifact.payload));
    Ok(())
}
