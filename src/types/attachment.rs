use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An uploaded file resolved to a publicly retrievable URL.
///
/// This is the output of the attachment uploader and the input to
/// [`crate::types::NewMessage::with_attachment`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Public URL of the stored object.
    pub url: String,

    /// Original file name, kept for display next to the message.
    pub name: String,
}

/// A local file staged for upload.
///
/// Carries everything the uploader needs to validate and store the file;
/// nothing here touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentSource {
    /// Original file name, including extension.
    pub name: String,

    /// MIME type of the file contents.
    pub content_type: String,

    /// Raw file contents.
    pub bytes: Bytes,
}

impl AttachmentSource {
    /// Stages a file for upload.
    pub fn new<S: Into<String>>(name: S, content_type: S, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Returns the size of the file in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the file is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns the file extension, if the name has one.
    pub fn extension(&self) -> Option<&str> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}
