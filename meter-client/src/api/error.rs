use reqwest::StatusCode;

/// Failures talking to either remote API. `endpoint` is the request path
/// without its query string, which carries credentials.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned unexpected status {status}")]
    Status { endpoint: String, status: StatusCode },
    #[error("could not decode reply from {endpoint}: {detail}")]
    Decode { endpoint: String, detail: String },
    #[error("reply from {endpoint} is missing `{field}`")]
    MissingField { endpoint: String, field: &'static str },
    #[error("failed to format request timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

impl ApiError {
    /// True for failures of the remote side (connection, HTTP status) as
    /// opposed to replies that arrived but could not be understood.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ApiError::Transport { .. } | ApiError::Status { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport { source, .. } => source.status(),
            _ => None,
        }
    }
}
