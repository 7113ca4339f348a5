//! Common error types for flash collaborators

use thiserror::Error;

/// Result type for collaborator operations
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Errors reported by build resolvers, devices and property stores
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Requested build, branch or record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Build token could not be interpreted
    #[error("Invalid build token: {0}")]
    InvalidToken(String),

    /// Device could not be reached
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Device or tool answered with something we could not parse
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollaboratorError {
    /// Short machine-readable kind, logged alongside failed attempts
    pub fn kind(&self) -> &'static str {
        match self {
            CollaboratorError::NotFound(_) => "not_found",
            CollaboratorError::InvalidToken(_) => "invalid_token",
            CollaboratorError::DeviceUnavailable(_) => "device_unavailable",
            CollaboratorError::InvalidResponse(_) => "invalid_response",
            CollaboratorError::Io(_) => "io",
            CollaboratorError::Json(_) => "json",
            CollaboratorError::Internal(_) => "internal",
        }
    }
}

/// Errors raised while constructing an [`UpdateRequest`](crate::UpdateRequest)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("unknown image kind: '{0}'")]
    UnknownImageKind(String),

    #[error("build token must not be empty")]
    EmptyBuildToken,

    #[error("branch must not be empty")]
    EmptyBranch,

    #[error("max attempts must be at least 1")]
    NoAttempts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(CollaboratorError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(
            CollaboratorError::DeviceUnavailable("usb".into()).kind(),
            "device_unavailable"
        );
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(CollaboratorError::from(io).kind(), "io");
    }

    #[test]
    fn test_request_error_display() {
        assert_eq!(
            RequestError::UnknownImageKind("beta".into()).to_string(),
            "unknown image kind: 'beta'"
        );
    }
}
