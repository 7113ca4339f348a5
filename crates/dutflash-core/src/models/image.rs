//! Image kinds and their tracking tags

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// Logical flavor of firmware image that can be flashed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// Engineering build with debug tooling enabled
    #[default]
    Development,
    /// Customer-facing build
    Production,
    /// Manufacturing line image
    Factory,
    /// Diagnostic build for failure analysis
    Diagnostic,
}

impl ImageKind {
    /// All known image kinds
    pub const ALL: [ImageKind; 4] = [
        ImageKind::Development,
        ImageKind::Production,
        ImageKind::Factory,
        ImageKind::Diagnostic,
    ];

    /// Tag prefixed to the build number in the tracking record
    pub fn tag(&self) -> &'static str {
        match self {
            ImageKind::Development => "D",
            ImageKind::Production => "P",
            ImageKind::Factory => "F",
            ImageKind::Diagnostic => "X",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Development => "development",
            ImageKind::Production => "production",
            ImageKind::Factory => "factory",
            ImageKind::Diagnostic => "diagnostic",
        }
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(ImageKind::Development),
            "production" => Ok(ImageKind::Production),
            "factory" => Ok(ImageKind::Factory),
            "diagnostic" => Ok(ImageKind::Diagnostic),
            _ => Err(RequestError::UnknownImageKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_kinds() {
        for kind in ImageKind::ALL {
            assert_eq!(kind.as_str().parse::<ImageKind>().unwrap(), kind);
        }
        assert_eq!(
            " Production ".parse::<ImageKind>().unwrap(),
            ImageKind::Production
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "nightly".parse::<ImageKind>().unwrap_err();
        assert_eq!(err, RequestError::UnknownImageKind("nightly".to_string()));
    }

    #[test]
    fn test_tags_are_distinct() {
        let mut tags: Vec<_> = ImageKind::ALL.iter().map(|k| k.tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), ImageKind::ALL.len());
        assert_eq!(ImageKind::default().tag(), "D");
    }
}
