//! Control-plane client error types.

/// Errors from APIM control-plane calls.
#[derive(Debug, thiserror::Error)]
pub enum ApimError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// ARM returned a non-2xx status.
    #[error("APIM {endpoint} returned {status}: {body}")]
    ApiError {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// Access token could not be acquired.
    #[error("failed to acquire ARM access token: {0}")]
    Credential(String),
    /// The subscription exists but no primary key could be read for it.
    #[error("subscription {sid} has no primary key")]
    MissingKey { sid: String },
}

impl ApimError {
    /// Whether the control plane reported the subscription as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}
