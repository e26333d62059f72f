//! RPC transport error types.

use thiserror::Error;

/// Errors from a single JSON-RPC call.
///
/// Everything except [`RpcError::Server`] is a transport error: the call
/// never produced a trustworthy reply.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Network or HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The daemon answered with a non-success status.
    #[error("daemon returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The reply body was not valid JSON or had the wrong shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The reply violated the JSON-RPC envelope contract.
    #[error("protocol violation: {message}")]
    Protocol {
        /// What was wrong.
        message: String,
    },

    /// The reply answered a different request.
    #[error("response id mismatch: expected {expected}, got {actual:?}")]
    IdMismatch {
        /// Id sent with the request.
        expected: String,
        /// Id found in the reply, if any.
        actual: Option<String>,
    },

    /// The daemon reported an error for this call.
    #[error("server error {code}: {message}")]
    Server {
        /// JSON-RPC error code, verbatim.
        code: i64,
        /// Error message, verbatim.
        message: String,
    },
}

impl RpcError {
    /// Whether the failure happened before a valid reply was obtained.
    pub fn is_transport(&self) -> bool {
        !self.is_server()
    }

    /// Whether the daemon itself reported the error.
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// The server error code, if this is a server error.
    pub fn server_code(&self) -> Option<i64> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

/// Result type for RPC calls.
pub type Result<T> = std::result::Result<T, RpcError>;

/// An unusable daemon base URL.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The URL did not parse.
    #[error("invalid daemon URL '{url}': {source}")]
    Invalid {
        /// The URL as given.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },
    /// The URL is not http or https.
    #[error("unsupported daemon URL scheme '{scheme}'")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
    },
    /// The URL has no host.
    #[error("daemon URL '{url}' has no host")]
    MissingHost {
        /// The URL as given.
        url: String,
    },
}
