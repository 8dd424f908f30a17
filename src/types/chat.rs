use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A chat room as stored in the backend's `chats` table.
///
/// Chats are created by explicit user action and never deleted by this
/// client. The list view orders them by `updated_at`, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    /// Row identifier assigned by the backend.
    pub id: String,

    /// Display name. Non-empty by construction.
    pub name: String,

    /// Preview of the most recent message, if the backend maintains one.
    pub last_message: Option<String>,

    /// Optional avatar image URL.
    pub avatar_url: Option<String>,

    /// Last time anything in this chat changed.
    #[serde(with = "crate::utils::time")]
    pub updated_at: OffsetDateTime,
}

/// Insert parameters for a new chat row.
///
/// Only the name is supplied; the backend fills in the identifier and
/// timestamps and returns the completed [`Chat`] row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewChat {
    /// Display name for the new chat.
    pub name: String,
}

impl NewChat {
    /// Creates insert parameters for a chat with the given name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}
