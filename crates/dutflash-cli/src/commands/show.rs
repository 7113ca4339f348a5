//! Show command - stored device properties

use anyhow::{Context, Result};
use dutflash_local::JsonPropertyStore;
use serde_json::Value;

use crate::config::MergedConfig;
use crate::output::OutputContext;

pub async fn show(device: &str, config: &MergedConfig, ctx: &OutputContext) -> Result<()> {
    let store = JsonPropertyStore::new(&config.properties_dir);
    let record = store
        .load(device)
        .await
        .with_context(|| format!("Failed to load properties of device '{}'", device))?;

    let pairs: Vec<(String, String)> = record
        .persistable()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.to_string(), rendered)
        })
        .collect();
    ctx.print_kv(&pairs);
    Ok(())
}
