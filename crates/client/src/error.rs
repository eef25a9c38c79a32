use atelier_core::error::CoreError;

/// Errors from the HTTP backend layer.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            // Malformed requests, redirect loops and undecodable bodies fail
            // the same way on every attempt.
            Self::Request(e) => !(e.is_builder() || e.is_redirect() || e.is_decode()),
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        match &err {
            ClientError::ApiError { status: 404, body } => CoreError::NotFound {
                entity: "resource",
                id: body.clone(),
            },
            _ if err.is_transient() => CoreError::TransientNetwork(err.to_string()),
            _ => CoreError::Backend(err.to_string()),
        }
    }
}
