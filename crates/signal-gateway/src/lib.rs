//! # signal-gateway
//!
//! Client gateway for a Signal daemon exposing JSON-RPC and a push-event
//! stream over HTTP.
//!
//! - [`SignalGateway`]: the facade. Enable it to check the daemon and start
//!   the event-stream worker; disable it to stop everything.
//! - [`listener`]: the reconnecting event-stream worker and its state machine
//! - [`cache`]: per-account group and identity directories with an idle TTL
//! - [`errors`]: [`GatewayError`] and [`StreamError`]

#![deny(unsafe_code)]

pub mod cache;
pub mod errors;
pub mod gateway;
pub mod listener;

pub use cache::{GroupMap, IdentityMap, directory_json};
pub use errors::{GatewayError, Result, StreamError};
pub use gateway::{DeleteRequest, ReactionRequest, SendMessage, SignalGateway};
pub use listener::StreamState;

pub use signal_core::{Attachment, DomainMessage, ListenerId, Quote};
pub use signal_events::{ListenerError, MessageListener};
pub use signal_settings::GatewaySettings;
