//! # signal-events
//!
//! Inbound side of the gateway:
//!
//! - [`stream`] splits the push-event byte stream into lines and picks out
//!   the `data:` payloads that follow an `event:receive` marker
//! - [`classifier`] turns one payload into a [`DomainMessage`] or a reason
//!   it was ignored
//! - [`registry`] keeps a bounded replay history and fans each message out
//!   to registered listeners
//!
//! [`DomainMessage`]: signal_core::DomainMessage

#![deny(unsafe_code)]

pub mod classifier;
pub mod registry;
pub mod stream;

pub use classifier::{Classification, Classifier, GroupNameResolver, Ignored, parse_event};
pub use registry::{ListenerError, MessageListener, ReplayRegistry};
pub use stream::{EventFramer, StreamLine, split_lines};
