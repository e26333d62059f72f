//! # signal-rpc
//!
//! JSON-RPC 2.0 transport for the Signal daemon.
//!
//! - [`Endpoint`] derives the RPC and event-stream addresses from one base URL
//! - [`RpcClient::call`] posts one request and validates the reply
//!   (status, object shape, protocol tag, id correlation, server error)
//!
//! There is no retry here; callers decide whether a failure is worth retrying.

#![deny(unsafe_code)]

pub mod client;
pub mod endpoint;
pub mod errors;
pub mod types;

pub use client::RpcClient;
pub use endpoint::Endpoint;
pub use errors::{EndpointError, Result, RpcError};
pub use types::{RpcErrorBody, RpcRequest, RpcResponse};
