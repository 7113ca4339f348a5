//! Resolve command - show what a build token points at

use anyhow::{Context, Result};
use dutflash_core::BuildResolver;
use dutflash_local::LocalBuildResolver;

use crate::config::MergedConfig;
use crate::output::OutputContext;

/// Resolve a build token and report whether its artifact is downloaded
pub async fn resolve(
    build: &str,
    branch: Option<&str>,
    config: &MergedConfig,
    ctx: &OutputContext,
) -> Result<()> {
    let branch = branch.unwrap_or(&config.branch);
    let resolver = LocalBuildResolver::new(&config.build_store).with_tool_path(&config.tool_path);

    let info = resolver
        .resolve(build, branch)
        .await
        .with_context(|| format!("Failed to resolve build '{}' on branch '{}'", build, branch))?;
    let artifact = resolver
        .locate_artifact(branch, &info.build_number, &config.download_path)
        .await?;
    let present = resolver.artifact_exists(&artifact).await;

    let mut pairs = vec![
        ("branch".to_string(), branch.to_string()),
        ("build".to_string(), info.build_number.clone()),
        ("artifact".to_string(), artifact.display().to_string()),
        ("downloaded".to_string(), present.to_string()),
    ];
    pairs.extend(info.metadata.into_iter());
    ctx.print_kv(&pairs);
    Ok(())
}
