// Public modules
pub mod attachment;
pub mod chat;
pub mod message;
pub mod session;

// Re-exports
pub use attachment::{Attachment, AttachmentSource};
pub use chat::{Chat, NewChat};
pub use message::{Message, NewMessage};
pub use session::{Session, SessionState, User};
