use crate::types::Platform;
use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum PlatformError {
    #[error("no project or version found on {platform} for {identifier}")]
    NotFound {
        platform: Platform,
        identifier: String,
    },

    #[error("{platform} responded with status {status}")]
    Upstream {
        platform: Platform,
        status: StatusCode,
    },

    #[error("{platform} unavailable after {attempts} attempts")]
    Unavailable { platform: Platform, attempts: u32 },

    #[error("could not decode {platform} response: {source}")]
    Decode {
        platform: Platform,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not build {platform} request: {source}")]
    Request {
        platform: Platform,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl PlatformError {
    pub fn not_found(platform: Platform, identifier: impl Into<String>) -> Self {
        PlatformError::NotFound {
            platform,
            identifier: identifier.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, PlatformError::Unavailable { .. })
    }
}
