//! Config command handler.

use anyhow::Result;

use fetcher_core::FetcherConfig;

/// Print the effective configuration as JSON.
///
/// Does not need a workstation, so it runs before bootstrap.
pub fn execute(config: &FetcherConfig) -> Result<()> {
    let mut value = serde_json::to_value(config)?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "resolved_cache_dir".to_string(),
            serde_json::Value::String(config.resolved_cache_dir()?.display().to_string()),
        );
    }
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
