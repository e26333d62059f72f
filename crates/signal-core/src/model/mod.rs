//! Domain model shared by the transport, the event pipeline and the facade.

mod directory;
mod message;
mod outbound;

pub use directory::{Group, GroupMember, GroupPermissions, Identity};
pub use message::{DomainMessage, Envelope, Reaction, TextMessage};
pub use outbound::{Attachment, Quote};
