//! Extras attached to outbound sends.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Reference to a prior message, rendered as a quote above the new one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Timestamp of the quoted message.
    pub timestamp: i64,
    /// Author of the quoted message.
    pub author: String,
    /// Quoted text.
    pub message: String,
    /// Optional mention inside the quote (`start:length:uuid`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<String>,
}

impl Quote {
    /// Create a quote without a mention.
    pub fn new(timestamp: i64, author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            author: author.into(),
            message: message.into(),
            mention: None,
        }
    }
}

/// Inline attachment sent as a `data:` URI.
///
/// The daemon uploads the content itself; the gateway only renders the
/// descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// File name shown to recipients.
    pub filename: String,
    /// Base64-encoded file content.
    pub base64_content: String,
}

impl Attachment {
    /// Create from already-encoded content.
    pub fn new(
        mime_type: impl Into<String>,
        filename: impl Into<String>,
        base64_content: impl Into<String>,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            filename: filename.into(),
            base64_content: base64_content.into(),
        }
    }

    /// Create from raw bytes.
    pub fn from_bytes(
        mime_type: impl Into<String>,
        filename: impl Into<String>,
        content: &[u8],
    ) -> Self {
        Self::new(
            mime_type,
            filename,
            base64::engine::general_purpose::STANDARD.encode(content),
        )
    }

    /// Render the `attachment` parameter accepted by `send`:
    /// `data:<mime>;filename=<name>;charset=utf8;base64,<content>`.
    ///
    /// The file name is form-urlencoded with spaces written as `%20`.
    pub fn to_attachment_param(&self) -> String {
        let filename: String = url::form_urlencoded::byte_serialize(self.filename.as_bytes())
            .collect::<String>()
            .replace('+', "%20");
        format!(
            "data:{};filename={};charset=utf8;base64,{}",
            self.mime_type, filename, self.base64_content
        )
    }
}
