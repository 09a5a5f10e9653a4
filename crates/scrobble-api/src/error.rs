use thiserror::Error;

/// Failure of a single SIMKL request, after any retries
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Rate limiting, server errors and network failures that outlived the
    /// retry budget. Safe to try again later.
    #[error("temporary SIMKL failure: {message}")]
    Transient { status: Option<u16>, message: String },

    #[error("not authorized with SIMKL (sign in again)")]
    Unauthorized,

    /// The request itself was refused; retrying it unchanged will not help
    #[error("SIMKL rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("could not decode SIMKL response: {0}")]
    Decode(String),

    #[error("SIMKL client misconfigured: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }

    pub fn transient(status: Option<u16>, message: impl Into<String>) -> Self {
        ApiError::Transient {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return ApiError::Config(err.to_string());
        }
        if err.is_decode() {
            return ApiError::Decode(err.to_string());
        }
        // Timeouts, refused connections and dropped bodies
        ApiError::transient(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
