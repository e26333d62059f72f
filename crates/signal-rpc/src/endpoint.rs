//! Daemon addresses derived from a single base URL.

use std::fmt;

use signal_core::constants::{EVENTS_PATH, RPC_PATH};
use url::Url;

use crate::errors::EndpointError;

/// The RPC and event-stream addresses of one daemon.
///
/// Any path on the base URL is kept as a prefix, so a daemon mounted behind
/// a reverse proxy at `/signal` resolves to `/signal/api/v1/rpc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    rpc: Url,
    events: Url,
}

impl Endpoint {
    /// Parse a base URL such as `http://127.0.0.1:8080`.
    pub fn parse(base: &str) -> Result<Self, EndpointError> {
        let trimmed = base.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|source| EndpointError::Invalid {
            url: base.to_string(),
            source,
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(EndpointError::UnsupportedScheme {
                    scheme: other.to_string(),
                });
            }
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(EndpointError::MissingHost {
                url: base.to_string(),
            });
        }

        let join = |path: &str| {
            Url::parse(&format!("{trimmed}{path}")).map_err(|source| EndpointError::Invalid {
                url: base.to_string(),
                source,
            })
        };
        let rpc = join(RPC_PATH)?;
        let events = join(EVENTS_PATH)?;

        Ok(Self {
            base: parsed,
            rpc,
            events,
        })
    }

    /// The base URL as configured.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `POST` target for JSON-RPC calls.
    pub fn rpc_url(&self) -> &Url {
        &self.rpc
    }

    /// `GET` target for the push-event stream.
    pub fn events_url(&self) -> &Url {
        &self.events
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.as_str().trim_end_matches('/'))
    }
}
