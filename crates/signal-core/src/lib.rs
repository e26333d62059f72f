//! # signal-core
//!
//! Foundation types shared by every gateway crate:
//!
//! - **Branded IDs**: [`ids::ListenerId`] and [`ids::RpcId`] newtypes
//! - **Domain messages**: [`model::DomainMessage`] with `Text` and `Reaction` variants
//!   sharing an [`model::Envelope`]
//! - **Directory data**: [`model::Group`] and [`model::Identity`] as returned by the daemon
//! - **Outbound extras**: [`model::Quote`] and [`model::Attachment`]
//! - **Constants**: protocol paths and lifecycle defaults in [`constants`]

#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod model;
pub mod text;

pub use ids::{ListenerId, RpcId};
pub use model::{
    Attachment, DomainMessage, Envelope, Group, GroupMember, GroupPermissions, Identity, Quote,
    Reaction, TextMessage,
};
