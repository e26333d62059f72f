//! Gateway error types.

use signal_rpc::{EndpointError, RpcError};
use signal_settings::SettingsError;
use thiserror::Error;

/// Errors surfaced by [`SignalGateway`](crate::SignalGateway) operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// An RPC call failed (transport or server).
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The configured daemon URL is unusable.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// Settings could not be loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// A call succeeded but its result had an unexpected shape.
    #[error("unexpected result from '{method}': {source}")]
    Decode {
        /// RPC method whose result failed to decode.
        method: &'static str,
        /// Decoder error.
        source: serde_json::Error,
    },

    /// A send named neither recipients nor groups.
    #[error("no recipients or groups given")]
    NoRecipients,

    /// The daemon did not answer the version check.
    #[error("could not obtain version from signal daemon at {url}")]
    DaemonUnavailable {
        /// Base URL that was checked.
        url: String,
    },

    /// The gateway is not enabled.
    #[error("gateway is disabled")]
    Disabled,
}

impl GatewayError {
    /// The server error code, when the daemon reported the failure.
    pub fn server_code(&self) -> Option<i64> {
        match self {
            Self::Rpc(e) => e.server_code(),
            _ => None,
        }
    }
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Why one event-stream connection ended.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Connecting or reading failed.
    #[error("event stream I/O error: {0}")]
    Http(#[from] reqwest::Error),

    /// The daemon refused the stream.
    #[error("event stream rejected with HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_errors_pass_through() {
        let err: GatewayError = RpcError::Server {
            code: -1,
            message: "boom".into(),
        }
        .into();
        assert_eq!(err.to_string(), "server error -1: boom");
        assert_eq!(err.server_code(), Some(-1));
    }

    #[test]
    fn stream_status_display() {
        let err = StreamError::Status { status: 404 };
        assert_eq!(err.to_string(), "event stream rejected with HTTP 404");
    }

    #[test]
    fn decode_names_the_method() {
        let source = serde_json::from_str::<Vec<u8>>("{}").unwrap_err();
        let err = GatewayError::Decode {
            method: "listGroups",
            source,
        };
        assert!(err.to_string().starts_with("unexpected result from 'listGroups'"));
        assert_eq!(err.server_code(), None);
    }
}
