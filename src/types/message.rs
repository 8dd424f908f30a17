use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Attachment;

/// A message row from the backend's `messages` table.
///
/// Messages are immutable once created and ordered by `created_at`
/// ascending within a chat. Invariant: a message carries non-empty text
/// content or a non-empty attachment reference (or both).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Row identifier assigned by the backend.
    pub id: String,

    /// The chat this message belongs to.
    pub chat_id: String,

    /// Identifier of the sending user.
    pub sender_id: String,

    /// Text content. May be empty when an attachment is present.
    pub content: String,

    /// Creation timestamp assigned by the backend.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// Public URL of an attached file, if any.
    pub attachment_url: Option<String>,

    /// Original file name of the attachment, for display.
    pub attachment_name: Option<String>,
}

impl Message {
    /// Returns true if this message carries an attachment.
    pub fn has_attachment(&self) -> bool {
        self.attachment_url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Returns true if the message satisfies the content-or-attachment invariant.
    pub fn has_body(&self) -> bool {
        !self.content.is_empty() || self.has_attachment()
    }
}

/// Insert parameters for a new message row.
///
/// The backend assigns the identifier and creation timestamp and returns
/// the completed [`Message`] row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    /// The chat to post into.
    pub chat_id: String,

    /// Identifier of the sending user.
    pub sender_id: String,

    /// Text content or attachment caption.
    pub content: String,

    /// Public URL of an attached file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,

    /// Original file name of the attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
}

impl NewMessage {
    /// Creates insert parameters for a plain text message.
    pub fn text<S: Into<String>>(chat_id: S, sender_id: S, content: S) -> Self {
        Self {
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            attachment_url: None,
            attachment_name: None,
        }
    }

    /// Creates insert parameters for a message carrying an uploaded attachment.
    pub fn with_attachment<S: Into<String>>(
        chat_id: S,
        sender_id: S,
        caption: S,
        attachment: Attachment,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
            content: caption.into(),
            attachment_url: Some(attachment.url),
            attachment_name: Some(attachment.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample() -> Message {
        Message {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            content: "hello".to_string(),
            created_at: datetime!(2024-05-01 12:00:00 UTC),
            attachment_url: None,
            attachment_name: None,
        }
    }

    #[test]
    fn message_deserialization() {
        let json = r#"{
            "id": "m1",
            "chat_id": "c1",
            "sender_id": "u1",
            "content": "hello",
            "created_at": "2024-05-01T12:00:00Z",
            "attachment_url": null,
            "attachment_name": null
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message, sample());
    }

    #[test]
    fn body_invariant() {
        let mut message = sample();
        assert!(message.has_body());
        assert!(!message.has_attachment());

        message.content.clear();
        assert!(!message.has_body());

        message.attachment_url = Some("https://example.com/f.png".to_string());
        assert!(message.has_attachment());
        assert!(message.has_body());
    }

    #[test]
    fn text_params_omit_attachment_columns() {
        let params = NewMessage::text("c1", "u1", "hi");
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(
            json,
            r#"{"chat_id":"c1","sender_id":"u1","content":"hi"}"#
        );
    }

    #[test]
    fn attachment_params_carry_url_and_name() {
        let attachment = Attachment {
            url: "https://example.com/c1/f.png".to_string(),
            name: "photo.png".to_string(),
        };
        let params = NewMessage::with_attachment("c1", "u1", "look", attachment);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["attachment_url"], "https://example.com/c1/f.png");
        assert_eq!(json["attachment_name"], "photo.png");
        assert_eq!(json["content"], "look");
    }
}
