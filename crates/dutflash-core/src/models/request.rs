//! Update requests and build-token selection

use serde::{Deserialize, Serialize};

use super::image::ImageKind;
use crate::error::RequestError;

/// Build token used when nothing more specific was requested
pub const LATEST_BUILD: &str = "latest";

/// Branch used when neither the caller nor the config names one
pub const DEFAULT_BRANCH: &str = "main";

/// Number of update attempts made when the caller does not say otherwise
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Everything that determines one flash run.
///
/// Built once per invocation through [`UpdateRequest::builder`] and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRequest {
    build_token: String,
    branch: String,
    image_kind: ImageKind,
    force_flash: bool,
    abort_if_on_build: bool,
    max_attempts: u32,
}

impl UpdateRequest {
    /// Start building a request for the given build token
    pub fn builder(build_token: impl Into<String>) -> UpdateRequestBuilder {
        UpdateRequestBuilder::new(build_token)
    }

    pub fn build_token(&self) -> &str {
        &self.build_token
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn image_kind(&self) -> ImageKind {
        self.image_kind
    }

    /// Skip the "already on build" check and always flash
    pub fn force_flash(&self) -> bool {
        self.force_flash
    }

    /// Abort silently instead of reporting when the device is already on build
    pub fn abort_if_on_build(&self) -> bool {
        self.abort_if_on_build
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Builder for [`UpdateRequest`]
#[derive(Debug, Clone)]
pub struct UpdateRequestBuilder {
    build_token: String,
    branch: String,
    image_kind: ImageKind,
    force_flash: bool,
    abort_if_on_build: bool,
    max_attempts: u32,
}

impl UpdateRequestBuilder {
    fn new(build_token: impl Into<String>) -> Self {
        Self {
            build_token: build_token.into(),
            branch: DEFAULT_BRANCH.to_string(),
            image_kind: ImageKind::default(),
            force_flash: false,
            abort_if_on_build: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn image_kind(mut self, kind: ImageKind) -> Self {
        self.image_kind = kind;
        self
    }

    /// Set the image kind from its name, rejecting unknown names
    pub fn image_name(mut self, name: &str) -> Result<Self, RequestError> {
        self.image_kind = name.parse()?;
        Ok(self)
    }

    pub fn force_flash(mut self, force: bool) -> Self {
        self.force_flash = force;
        self
    }

    pub fn abort_if_on_build(mut self, abort: bool) -> Self {
        self.abort_if_on_build = abort;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Validate and freeze the request
    pub fn build(self) -> Result<UpdateRequest, RequestError> {
        let build_token = self.build_token.trim().to_string();
        if build_token.is_empty() {
            return Err(RequestError::EmptyBuildToken);
        }
        let branch = self.branch.trim().to_string();
        if branch.is_empty() {
            return Err(RequestError::EmptyBranch);
        }
        if self.max_attempts == 0 {
            return Err(RequestError::NoAttempts);
        }

        Ok(UpdateRequest {
            build_token,
            branch,
            image_kind: self.image_kind,
            force_flash: self.force_flash,
            abort_if_on_build: self.abort_if_on_build,
            max_attempts: self.max_attempts,
        })
    }
}

/// CI trigger payload that may carry the build to flash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTrigger {
    /// Trigger source, e.g. "cron" or "build"
    pub trigger_type: String,
    /// Build announced by the trigger
    #[serde(default)]
    pub build: Option<String>,
}

impl BuildTrigger {
    pub fn is_scheduled(&self) -> bool {
        self.trigger_type.eq_ignore_ascii_case("cron")
    }
}

/// Pick the build token for a run.
///
/// Scheduled (cron) triggers carry no build of their own, so the explicit
/// argument wins; any other trigger names the build it fired for.
pub fn select_build_token(trigger: Option<&BuildTrigger>, argument: Option<&str>) -> String {
    let chosen = match trigger {
        Some(trigger) if !trigger.is_scheduled() => trigger.build.as_deref(),
        _ => argument,
    };
    chosen
        .filter(|token| !token.trim().is_empty())
        .unwrap_or(LATEST_BUILD)
        .to_string()
}
