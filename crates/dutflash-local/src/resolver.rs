//! Build resolution against a local build store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dutflash_core::{BuildInfo, BuildResolver, CollaboratorError, CollaboratorResult, LATEST_BUILD};
use tracing::debug;

/// Default location of the device tool inside a downloaded build
pub const DEFAULT_TOOL_PATH: &str = "tools/devtool";

/// Resolves builds published as `<root>/<branch>/<build_number>/`.
///
/// Downloaded builds live under `<download>/<branch>/<build_number>/`; the
/// artifact used for the installed-build check is the device tool shipped
/// inside it.
#[derive(Debug, Clone)]
pub struct LocalBuildResolver {
    root: PathBuf,
    tool_path: PathBuf,
}

impl LocalBuildResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tool_path: PathBuf::from(DEFAULT_TOOL_PATH),
        }
    }

    /// Override the tool location relative to a build directory
    pub fn with_tool_path(mut self, tool_path: impl Into<PathBuf>) -> Self {
        self.tool_path = tool_path.into();
        self
    }

    /// Highest numeric build directory published for `branch`
    async fn latest(&self, branch: &str) -> CollaboratorResult<String> {
        let branch_dir = self.root.join(branch);
        let mut entries = tokio::fs::read_dir(&branch_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CollaboratorError::NotFound(format!("branch '{}'", branch))
            } else {
                CollaboratorError::Io(e)
            }
        })?;

        let mut latest: Option<(u64, String)> = None;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Ok(number) = name.parse::<u64>() {
                if latest.as_ref().map_or(true, |(best, _)| number > *best) {
                    latest = Some((number, name));
                }
            }
        }

        latest
            .map(|(_, name)| name)
            .ok_or_else(|| CollaboratorError::NotFound(format!("no builds on branch '{}'", branch)))
    }
}

/// Strip decorations from an explicit build token ("#120", "v120", " 120 ")
pub fn normalize_build_token(token: &str) -> CollaboratorResult<String> {
    let trimmed = token.trim();
    let number = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix('v'))
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(CollaboratorError::InvalidToken(token.to_string()));
    }
    Ok(number.to_string())
}

#[async_trait]
impl BuildResolver for LocalBuildResolver {
    async fn resolve(&self, token: &str, branch: &str) -> CollaboratorResult<BuildInfo> {
        let build_number = if token.trim().eq_ignore_ascii_case(LATEST_BUILD) {
            self.latest(branch).await?
        } else {
            normalize_build_token(token)?
        };

        debug!(token, branch, build = %build_number, "Resolved build token");
        let source = self.root.join(branch).join(&build_number);
        Ok(BuildInfo::new(build_number).with_metadata("source", source.display().to_string()))
    }

    async fn locate_artifact(
        &self,
        branch: &str,
        build_number: &str,
        download_path: &Path,
    ) -> CollaboratorResult<PathBuf> {
        Ok(download_path
            .join(branch)
            .join(build_number)
            .join(&self.tool_path))
    }

    async fn artifact_exists(&self, artifact: &Path) -> bool {
        tokio::fs::metadata(artifact)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }
}
