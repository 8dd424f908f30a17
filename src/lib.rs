// Public modules
pub mod app;
pub mod auth;
pub mod chats;
pub mod client;
pub mod error;
pub mod feed;
pub mod messages;
pub mod observability;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports
pub use auth::{SessionWatch, validate_sign_in, validate_sign_up};
pub use chats::{ChatList, ChatStore};
pub use client::{Backend, ChangeFeed};
pub use error::{Error, Result};
pub use messages::{DEFAULT_ATTACHMENT_CAPTION, MessageStore, MessageWindow, WindowState};
pub use storage::{
    AttachmentUploader, DEFAULT_BUCKET, MAX_ATTACHMENT_BYTES, ObjectStore,
    content_type_for_extension,
};
pub use types::*;
