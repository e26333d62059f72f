//! Classification of push-event payloads into domain messages.
//!
//! A payload must carry `account` and an `envelope` with a numeric
//! `timestamp`. Within `envelope.dataMessage`, a non-null `message` wins over
//! `reaction`; `remoteDelete`, `receiptMessage` and `typingMessage` are
//! recognised and dropped. Nothing here returns an error: every rejection is
//! logged and reported as [`Classification::Ignored`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use signal_core::constants::UNKNOWN_SOURCE;
use signal_core::text::truncate_str;
use signal_core::{DomainMessage, Envelope, Reaction, TextMessage};
use tracing::{debug, info, warn};

/// Why a payload produced no message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ignored {
    /// The data line was not valid JSON.
    InvalidJson,
    /// The payload was not a JSON object.
    NotAnObject,
    /// No string `account` field.
    MissingAccount,
    /// No `envelope` object.
    MissingEnvelope,
    /// The envelope has no numeric `timestamp`.
    MissingTimestamp,
    /// A `reaction` that is not an object.
    MalformedReaction,
    /// A remote delete request.
    RemoteDelete,
    /// A delivery or read receipt.
    Receipt,
    /// A typing indicator.
    Typing,
    /// Any other shape.
    Unsupported,
}

impl Ignored {
    /// Whether the payload violated the event contract (as opposed to being
    /// a recognised kind the gateway does not deliver).
    pub fn is_malformed(self) -> bool {
        matches!(
            self,
            Self::InvalidJson
                | Self::NotAnObject
                | Self::MissingAccount
                | Self::MissingEnvelope
                | Self::MissingTimestamp
                | Self::MalformedReaction
        )
    }

    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingAccount => "missing_account",
            Self::MissingEnvelope => "missing_envelope",
            Self::MissingTimestamp => "missing_timestamp",
            Self::MalformedReaction => "malformed_reaction",
            Self::RemoteDelete => "remote_delete",
            Self::Receipt => "receipt",
            Self::Typing => "typing",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Ignored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// A message to publish.
    Message(DomainMessage),
    /// Nothing to publish.
    Ignored(Ignored),
}

impl Classification {
    /// The message, if any.
    pub fn into_message(self) -> Option<DomainMessage> {
        match self {
            Self::Message(m) => Some(m),
            Self::Ignored(_) => None,
        }
    }
}

/// Error type returned by a [`GroupNameResolver`].
pub type ResolveError = Box<dyn std::error::Error + Send + Sync>;

/// Looks up group titles for enrichment.
#[async_trait]
pub trait GroupNameResolver: Send + Sync {
    /// Title of `group_id` as seen by `account`; `Ok(None)` when unknown.
    async fn group_name(
        &self,
        account: &str,
        group_id: &str,
    ) -> Result<Option<String>, ResolveError>;
}

/// Classifier with optional group-title enrichment.
#[derive(Clone, Default)]
pub struct Classifier {
    resolver: Option<Arc<dyn GroupNameResolver>>,
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("resolves_groups", &self.resolver.is_some())
            .finish()
    }
}

impl Classifier {
    /// Classifier that resolves group titles through `resolver`.
    pub fn new(resolver: Arc<dyn GroupNameResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    /// Classifier that leaves `group_name` unset.
    pub fn without_groups() -> Self {
        Self::default()
    }

    /// Parse and classify the payload of one `data:` line.
    pub async fn classify_line(&self, data: &str) -> Classification {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => self.classify(&value).await,
            Err(e) => {
                warn!(error = %e, data_preview = truncate_str(data, 100), "dropping unparsable event payload");
                Classification::Ignored(Ignored::InvalidJson)
            }
        }
    }

    /// Classify one payload and attach the group title when resolvable.
    ///
    /// Resolution failures are logged and leave `group_name` unset.
    pub async fn classify(&self, payload: &Value) -> Classification {
        let message = match parse_event(payload) {
            Classification::Message(m) => m,
            ignored @ Classification::Ignored(_) => return ignored,
        };

        let Some(resolver) = &self.resolver else {
            return Classification::Message(message);
        };
        let Some(group_id) = message.envelope().group_id.clone() else {
            return Classification::Message(message);
        };

        match resolver.group_name(message.account(), &group_id).await {
            Ok(Some(name)) => Classification::Message(message.with_group_name(name)),
            Ok(None) => {
                debug!(account = message.account(), group_id = %group_id, "group not found in cache");
                Classification::Message(message)
            }
            Err(e) => {
                warn!(account = message.account(), group_id = %group_id, error = %e, "group name lookup failed");
                Classification::Message(message)
            }
        }
    }
}

/// Classify one payload without group-title enrichment.
pub fn parse_event(payload: &Value) -> Classification {
    match classify_object(payload) {
        Ok(message) => Classification::Message(message),
        Err(reason) => {
            if reason.is_malformed() {
                warn!(%reason, payload_preview = %preview(payload), "dropping malformed event");
            } else if reason == Ignored::Unsupported {
                warn!(payload_preview = %preview(payload), "unsupported event");
            } else {
                debug!(%reason, "event not delivered");
            }
            Classification::Ignored(reason)
        }
    }
}

fn classify_object(payload: &Value) -> Result<DomainMessage, Ignored> {
    let root = payload.as_object().ok_or(Ignored::NotAnObject)?;
    let account = root
        .get("account")
        .and_then(Value::as_str)
        .ok_or(Ignored::MissingAccount)?;
    let envelope = root
        .get("envelope")
        .and_then(Value::as_object)
        .ok_or(Ignored::MissingEnvelope)?;
    let timestamp = envelope
        .get("timestamp")
        .and_then(Value::as_i64)
        .ok_or(Ignored::MissingTimestamp)?;

    let Some(data) = envelope.get("dataMessage").and_then(Value::as_object) else {
        if envelope.contains_key("receiptMessage") {
            return Err(Ignored::Receipt);
        }
        if envelope.contains_key("typingMessage") {
            return Err(Ignored::Typing);
        }
        return Err(Ignored::Unsupported);
    };

    let meta = Envelope {
        account: account.to_string(),
        source_number: source_field(envelope, "sourceNumber"),
        source_uuid: source_field(envelope, "sourceUuid"),
        source_name: source_field(envelope, "sourceName"),
        timestamp,
        group_id: data
            .get("groupInfo")
            .and_then(|g| g.get("groupId"))
            .and_then(Value::as_str)
            .map(str::to_string),
        group_name: None,
    };

    if let Some(body) = data.get("message").filter(|m| !m.is_null()) {
        info!(account, source = %meta.source_number, "received message");
        return Ok(DomainMessage::Text(TextMessage {
            body: body
                .as_str()
                .map_or_else(|| body.to_string(), str::to_string),
            view_once: data.get("viewOnce").and_then(Value::as_bool).unwrap_or(false),
            expires_in_seconds: data
                .get("expiresInSeconds")
                .and_then(Value::as_i64)
                .unwrap_or(-1),
            envelope: meta,
        }));
    }

    if let Some(reaction) = data.get("reaction").filter(|r| !r.is_null()) {
        let reaction = reaction.as_object().ok_or(Ignored::MalformedReaction)?;
        let emoji = reaction.get("emoji").and_then(Value::as_str).unwrap_or_default();
        let target_author = ["targetAuthorNumber", "targetAuthor", "targetAuthorUuid"]
            .iter()
            .find_map(|k| reaction.get(*k).and_then(Value::as_str))
            .unwrap_or(UNKNOWN_SOURCE);
        info!(account, source = %meta.source_number, "received reaction");
        return Ok(DomainMessage::Reaction(Reaction {
            emoji: emoji.to_string(),
            target_author: target_author.to_string(),
            target_sent_timestamp: reaction
                .get("targetSentTimestamp")
                .and_then(Value::as_i64)
                .unwrap_or(-1),
            remove: reaction
                .get("isRemove")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            envelope: meta,
        }));
    }

    if data.contains_key("remoteDelete") {
        return Err(Ignored::RemoteDelete);
    }
    Err(Ignored::Unsupported)
}

fn source_field(envelope: &Map<String, Value>, key: &str) -> String {
    envelope
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

fn preview(payload: &Value) -> String {
    let s = payload.to_string();
    truncate_str(&s, 200).to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use serde_json::json;
    use signal_logging::capture_logs;
    use tracing::Level;

    use super::*;

    fn text_event() -> Value {
        json!({
            "account": "+1555",
            "envelope": {
                "timestamp": 1000,
                "sourceNumber": "+1666",
                "dataMessage": {"message": "hi", "viewOnce": false, "expiresInSeconds": -1}
            }
        })
    }

    fn reaction_event() -> Value {
        json!({
            "account": "+1555",
            "envelope": {
                "timestamp": 1000,
                "sourceNumber": "+1666",
                "dataMessage": {
                    "reaction": {
                        "emoji": "👍",
                        "targetAuthorNumber": "+1666",
                        "targetSentTimestamp": 1000,
                        "isRemove": false
                    }
                }
            }
        })
    }

    fn group_event(group_id: &str) -> Value {
        let mut event = text_event();
        event["envelope"]["dataMessage"]["groupInfo"] = json!({"groupId": group_id, "type": "DELIVER"});
        event
    }

    struct FixedResolver {
        calls: AtomicUsize,
        answer: Result<Option<&'static str>, &'static str>,
    }

    impl FixedResolver {
        fn new(answer: Result<Option<&'static str>, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                answer,
            })
        }
    }

    #[async_trait]
    impl GroupNameResolver for FixedResolver {
        async fn group_name(
            &self,
            _account: &str,
            _group_id: &str,
        ) -> Result<Option<String>, ResolveError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Ok(name) => Ok(name.map(str::to_string)),
                Err(e) => Err(e.into()),
            }
        }
    }

    #[test]
    fn text_message_scenario() {
        let msg = parse_event(&text_event()).into_message().unwrap();
        let DomainMessage::Text(text) = msg else {
            panic!("expected text message");
        };
        assert_eq!(text.envelope.source_number, "+1666");
        assert_eq!(text.envelope.account, "+1555");
        assert_eq!(text.body, "hi");
        assert_eq!(text.envelope.timestamp, 1000);
        assert_eq!(text.expires_in_seconds, -1);
        assert!(!text.view_once);
    }

    #[test]
    fn reaction_scenario() {
        let msg = parse_event(&reaction_event()).into_message().unwrap();
        let DomainMessage::Reaction(r) = msg else {
            panic!("expected reaction");
        };
        assert_eq!(r.emoji, "👍");
        assert_eq!(r.target_author, "+1666");
        assert_eq!(r.target_sent_timestamp, 1000);
        assert!(!r.remove);
    }

    #[test]
    fn missing_sources_default_to_unknown() {
        let event = json!({
            "account": "+1555",
            "envelope": {"timestamp": 5, "dataMessage": {"message": "x"}}
        });
        let msg = parse_event(&event).into_message().unwrap();
        let env = msg.envelope();
        assert_eq!(env.source_number, "Unknown");
        assert_eq!(env.source_uuid, "Unknown");
        assert_eq!(env.source_name, "Unknown");
    }

    #[test]
    fn null_message_falls_through_to_reaction() {
        let mut event = reaction_event();
        event["envelope"]["dataMessage"]["message"] = Value::Null;
        assert_matches!(
            parse_event(&event),
            Classification::Message(DomainMessage::Reaction(_))
        );
    }

    #[test]
    fn malformed_payloads_are_ignored() {
        let cases = [
            (json!([1, 2]), Ignored::NotAnObject),
            (json!({"envelope": {"timestamp": 1}}), Ignored::MissingAccount),
            (json!({"account": "+1555"}), Ignored::MissingEnvelope),
            (
                json!({"account": "+1555", "envelope": {"dataMessage": {"message": "x"}}}),
                Ignored::MissingTimestamp,
            ),
            (
                json!({"account": "+1555", "envelope": {"timestamp": "soon"}}),
                Ignored::MissingTimestamp,
            ),
        ];
        for (payload, reason) in cases {
            assert_eq!(parse_event(&payload), Classification::Ignored(reason));
        }
    }

    #[test]
    fn recognised_kinds_are_dropped() {
        let base = |envelope: Value| json!({"account": "+1555", "envelope": envelope});
        assert_eq!(
            parse_event(&base(json!({"timestamp": 1, "dataMessage": {"remoteDelete": {"timestamp": 0}}}))),
            Classification::Ignored(Ignored::RemoteDelete)
        );
        assert_eq!(
            parse_event(&base(json!({"timestamp": 1, "receiptMessage": {}}))),
            Classification::Ignored(Ignored::Receipt)
        );
        assert_eq!(
            parse_event(&base(json!({"timestamp": 1, "typingMessage": {}}))),
            Classification::Ignored(Ignored::Typing)
        );
        assert_eq!(
            parse_event(&base(json!({"timestamp": 1, "dataMessage": {"sticker": {}}}))),
            Classification::Ignored(Ignored::Unsupported)
        );
    }

    #[test]
    fn unsupported_data_message_logs_warning() {
        let (logs, _guard) = capture_logs();
        let event = json!({"account": "+1", "envelope": {"timestamp": 1, "dataMessage": {"poll": {}}}});
        let _ = parse_event(&event);
        assert!(logs.has_event(Level::WARN, "unsupported event"));
    }

    #[test]
    fn reaction_without_emoji_is_delivered() {
        let mut event = reaction_event();
        let _ = event["envelope"]["dataMessage"]["reaction"]
            .as_object_mut()
            .unwrap()
            .remove("emoji");
        let msg = parse_event(&event).into_message().unwrap();
        let DomainMessage::Reaction(r) = msg else {
            panic!("expected reaction");
        };
        assert_eq!(r.emoji, "");
        assert_eq!(r.target_author, "+1666");
    }

    #[test]
    fn non_object_reaction_is_malformed() {
        let mut event = reaction_event();
        event["envelope"]["dataMessage"]["reaction"] = json!("👍");
        assert_eq!(
            parse_event(&event),
            Classification::Ignored(Ignored::MalformedReaction)
        );
    }

    #[test]
    fn non_string_message_is_rendered_as_text() {
        let mut event = text_event();
        event["envelope"]["dataMessage"]["message"] = json!(42);
        let msg = parse_event(&event).into_message().unwrap();
        let DomainMessage::Text(text) = msg else {
            panic!("expected text message");
        };
        assert_eq!(text.body, "42");
    }

    #[tokio::test]
    async fn invalid_json_line_is_ignored() {
        let classifier = Classifier::without_groups();
        assert_eq!(
            classifier.classify_line("{\"account\": ").await,
            Classification::Ignored(Ignored::InvalidJson)
        );
    }

    #[tokio::test]
    async fn group_name_is_attached() {
        let resolver = FixedResolver::new(Ok(Some("TeamA")));
        let classifier = Classifier::new(resolver.clone());
        let msg = classifier.classify(&group_event("g1")).await.into_message().unwrap();
        assert_eq!(msg.envelope().group_id.as_deref(), Some("g1"));
        assert_eq!(msg.envelope().group_name.as_deref(), Some("TeamA"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolver_failure_keeps_message() {
        let resolver = FixedResolver::new(Err("daemon down"));
        let classifier = Classifier::new(resolver);
        let msg = classifier.classify(&group_event("g1")).await.into_message().unwrap();
        assert_eq!(msg.envelope().group_id.as_deref(), Some("g1"));
        assert!(msg.envelope().group_name.is_none());
    }

    #[tokio::test]
    async fn direct_message_skips_resolver() {
        let resolver = FixedResolver::new(Ok(Some("unused")));
        let classifier = Classifier::new(resolver.clone());
        let msg = classifier.classify(&text_event()).await.into_message().unwrap();
        assert!(msg.envelope().group_id.is_none());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }
}
