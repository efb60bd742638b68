//! Get command handler.
//!
//! Issues one fetch per URL and waits for every terminal result. Ctrl-C
//! cancels all outstanding callers; each still reports `cancelled`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use url::Url;

use fetcher_core::{CorrelationToken, FetchOutput, SessionClass};
use fetcher_workstation::FetchRequest;

use crate::bootstrap::CliContext;
use crate::commands::GetArgs;
use crate::presentation::ProgressBoard;

pub async fn execute(ctx: &CliContext, args: GetArgs) -> Result<()> {
    if let Some(dir) = &args.output {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    let (board, mut results) = ProgressBoard::new();
    if args.background {
        ctx.workstation.set_background_completion(|| {
            tracing::info!(target: "fetcher.cli", "Background session drained");
        });
    }

    let mut tokens = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let request = build_request(url, &args);
        tokens.push(request.token);
        ctx.workstation.fetch(request, board.listener(url));
    }

    let mut remaining = tokens.len();
    let mut failures = 0usize;
    while remaining > 0 {
        tokio::select! {
            completion = results.recv() => {
                let Some((url, result)) = completion else { break };
                remaining -= 1;
                match result {
                    Ok(output) => {
                        let line = describe(&url, &output, args.output.as_deref()).await?;
                        board.println(line);
                    }
                    Err(e) => {
                        failures += 1;
                        board.println(format!("✗ {url}: {e}"));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "fetcher.cli", pending = remaining, "Interrupted, cancelling");
                for token in &tokens {
                    ctx.workstation.cancel(*token);
                }
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} fetches failed", tokens.len());
    }
    Ok(())
}

fn build_request(url: &Url, args: &GetArgs) -> FetchRequest {
    let mut request = FetchRequest::new(url.clone(), CorrelationToken::new())
        .with_policy(args.policy.into())
        .with_format(args.format);
    if let Some(tier) = args.tier {
        request = request.with_tier(tier);
    }
    if args.background {
        request = request.with_session(SessionClass::Background);
    }
    request
}

/// One summary line per result, copying the payload out when asked.
async fn describe(url: &Url, output: &FetchOutput, copy_to: Option<&Path>) -> Result<String> {
    let artifact = &output.artifact;
    let mut line = format!(
        "✓ {url} [{}] {} bytes",
        output.provenance(),
        artifact.size()
    );

    if let Some(dir) = copy_to {
        let target = dir.join(file_name(url, artifact.meta.extension.as_deref()));
        tokio::fs::write(&target, &artifact.payload)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        line.push_str(&format!(" -> {}", target.display()));
    } else if let Some(path) = &artifact.meta.local_path {
        line.push_str(&format!(" at {}", path.display()));
    }
    Ok(line)
}

/// File name for a copied payload: the URL's last segment, or `download`.
fn file_name(url: &Url, extension: Option<&str>) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty());
    match (segment, extension) {
        (Some(segment), _) => segment.to_string(),
        (None, Some(ext)) => format!("download.{ext}"),
        (None, None) => "download".to_string(),
    }
}
