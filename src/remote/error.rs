use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no API URL configured")]
    NotConfigured,
    #[error("built without network support")]
    Disabled,
}

impl ApiError {
    /// Whether demo content may stand in. A server that answered and refused
    /// the request is not a reason to substitute content.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, ApiError::Rejected(_))
    }
}

#[cfg(feature = "network")]
impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ApiError::Status(status.as_u16()),
            None => ApiError::Network(e.to_string()),
        }
    }
}
