//! Inbound domain messages produced by the event classifier.

use serde::{Deserialize, Serialize};

/// Metadata shared by every delivered message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Local account (phone number) the event was received on.
    pub account: String,
    /// Sender phone number, or `"Unknown"`.
    pub source_number: String,
    /// Sender ACI/UUID, or `"Unknown"`.
    pub source_uuid: String,
    /// Sender profile name, or `"Unknown"`.
    pub source_name: String,
    /// Sender-assigned timestamp in milliseconds since the epoch.
    pub timestamp: i64,
    /// Internal group id when the message was sent to a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Group title, resolved through the group cache when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
}

/// A plain text message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    /// Envelope metadata.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Message body.
    pub body: String,
    /// Whether the message may be viewed only once.
    pub view_once: bool,
    /// Disappearing-message timer, `-1` when unset.
    pub expires_in_seconds: i64,
}

/// An emoji reaction to a prior message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// Envelope metadata.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Reaction emoji.
    pub emoji: String,
    /// Author of the message reacted to.
    pub target_author: String,
    /// Timestamp of the message reacted to.
    pub target_sent_timestamp: i64,
    /// Whether the reaction is being withdrawn.
    pub remove: bool,
}

/// A message delivered to listeners.
///
/// Events the gateway recognises but does not deliver (remote deletes,
/// receipts, typing indicators) never become a `DomainMessage`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainMessage {
    /// Text message.
    Text(TextMessage),
    /// Reaction.
    Reaction(Reaction),
}

impl DomainMessage {
    /// Shared envelope metadata.
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Text(m) => &m.envelope,
            Self::Reaction(r) => &r.envelope,
        }
    }

    /// Sender-assigned timestamp used for replay ordering.
    pub fn timestamp(&self) -> i64 {
        self.envelope().timestamp
    }

    /// Account the message was received on.
    pub fn account(&self) -> &str {
        &self.envelope().account
    }

    /// Short kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Reaction(_) => "reaction",
        }
    }

    /// Return the message with its group title set.
    #[must_use]
    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        let envelope = match &mut self {
            Self::Text(m) => &mut m.envelope,
            Self::Reaction(r) => &mut r.envelope,
        };
        envelope.group_name = Some(name.into());
        self
    }
}

impl From<TextMessage> for DomainMessage {
    fn from(m: TextMessage) -> Self {
        Self::Text(m)
    }
}

impl From<Reaction> for DomainMessage {
    fn from(r: Reaction) -> Self {
        Self::Reaction(r)
    }
}
