//! Attachment validation and upload.
//!
//! Files are validated entirely locally — size first, then content type —
//! before any storage path is constructed or any network call is made.
//! A passing file is stored under a chat-scoped path with a random name
//! (original extension preserved), uploaded with no-overwrite semantics,
//! and resolved to a public URL for the message record. Failure at any
//! step aborts; no message row is created for a failed upload.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;
use uuid::Uuid;

use crate::client::Backend;
use crate::error::{Error, Result};
use crate::observability::UPLOAD_REJECTS;
use crate::types::{Attachment, AttachmentSource};

/// Largest attachment the client will upload: 5 MiB.
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// Content types the client will upload.
pub const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "text/plain",
];

/// Bucket attachments land in unless the uploader is given another.
pub const DEFAULT_BUCKET: &str = "chat-attachments";

/// Cache lifetime advertised for uploaded objects.
const CACHE_MAX_AGE_SECS: u32 = 3600;

/// What the user sees when the bucket's policy rejects the upload. The
/// raw backend message would only confuse; this one names the remedy.
pub(crate) const PERMISSION_DENIED_MESSAGE: &str =
    "Storage access denied. Please contact the administrator to set up proper permissions.";

/// Object storage operations the uploader depends on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores an object, refusing to overwrite an existing one.
    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        cache_max_age: u32,
        body: Bytes,
    ) -> Result<()>;

    /// Resolves the public URL of a stored object.
    fn object_url(&self, bucket: &str, path: &str) -> Result<Url>;
}

#[async_trait]
impl ObjectStore for Backend {
    async fn put_object(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        cache_max_age: u32,
        body: Bytes,
    ) -> Result<()> {
        self.upload_object(bucket, path, content_type, cache_max_age, body)
            .await
    }

    fn object_url(&self, bucket: &str, path: &str) -> Result<Url> {
        self.public_url(bucket, path)
    }
}

/// Validates a staged file locally: size limit first, then content type.
pub fn validate(file: &AttachmentSource) -> Result<()> {
    if file.len() > MAX_ATTACHMENT_BYTES {
        UPLOAD_REJECTS.click();
        return Err(Error::validation(
            "File size must be less than 5MB",
            Some("size".to_string()),
        ));
    }
    if !ALLOWED_CONTENT_TYPES.contains(&file.content_type.as_str()) {
        UPLOAD_REJECTS.click();
        return Err(Error::validation(
            "Only images (JPEG, PNG, GIF), PDFs, and text files are allowed",
            Some("content_type".to_string()),
        ));
    }
    Ok(())
}

/// Constructs a chat-scoped storage path with a random file name,
/// preserving the original extension.
pub fn storage_path(chat_id: &str, file: &AttachmentSource) -> String {
    let name = Uuid::new_v4();
    match file.extension() {
        Some(ext) => format!("{chat_id}/{name}.{ext}"),
        None => format!("{chat_id}/{name}"),
    }
}

/// Guesses a content type from a file extension.
///
/// Only the types the uploader accepts are recognized; anything else is
/// `None` and will be rejected by [`validate`].
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}

/// Uploads attachments: validate, store, resolve URL, in that order.
pub struct AttachmentUploader<S: ObjectStore> {
    store: S,
    bucket: String,
}

impl<S: ObjectStore> AttachmentUploader<S> {
    /// Creates an uploader targeting the default bucket.
    pub fn new(store: S) -> Self {
        Self::with_bucket(store, DEFAULT_BUCKET)
    }

    /// Creates an uploader targeting a specific bucket.
    pub fn with_bucket<B: Into<String>>(store: S, bucket: B) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Validates and uploads a file, returning its public URL and
    /// original name for attachment to a message.
    pub async fn upload(&self, chat_id: &str, file: &AttachmentSource) -> Result<Attachment> {
        validate(file)?;

        let path = storage_path(chat_id, file);
        self.store
            .put_object(
                &self.bucket,
                &path,
                &file.content_type,
                CACHE_MAX_AGE_SECS,
                file.bytes.clone(),
            )
            .await
            .map_err(|e| {
                if e.is_permission() {
                    Error::permission(PERMISSION_DENIED_MESSAGE)
                } else {
                    e
                }
            })?;

        let url = self.store.object_url(&self.bucket, &path)?;
        Ok(Attachment {
            url: url.to_string(),
            name: file.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct MockStore {
        puts: Arc<Mutex<Vec<String>>>,
        fail_with: Option<Error>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                puts: Arc::new(Mutex::new(Vec::new())),
                fail_with: None,
            }
        }

        fn failing(error: Error) -> Self {
            Self {
                puts: Arc::new(Mutex::new(Vec::new())),
                fail_with: Some(error),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for MockStore {
        async fn put_object(
            &self,
            _bucket: &str,
            path: &str,
            _content_type: &str,
            _cache_max_age: u32,
            _body: Bytes,
        ) -> Result<()> {
            self.puts.lock().unwrap().push(path.to_string());
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        fn object_url(&self, bucket: &str, path: &str) -> Result<Url> {
            Ok(Url::parse(&format!(
                "https://chat.example.com/storage/v1/object/public/{bucket}/{path}"
            ))?)
        }
    }

    fn png(len: usize) -> AttachmentSource {
        AttachmentSource::new("photo.png", "image/png", Bytes::from(vec![0u8; len]))
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_any_network_call() {
        let store = MockStore::new();
        let puts = store.puts.clone();
        let uploader = AttachmentUploader::new(store);

        let jpeg = AttachmentSource::new(
            "big.jpg",
            "image/jpeg",
            Bytes::from(vec![0u8; 6 * 1024 * 1024]),
        );
        let err = uploader.upload("c1", &jpeg).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.message(), "File size must be less than 5MB");
        assert!(puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disallowed_type_is_rejected_before_any_network_call() {
        let store = MockStore::new();
        let puts = store.puts.clone();
        let uploader = AttachmentUploader::new(store);

        let exe = AttachmentSource::new(
            "setup.exe",
            "application/octet-stream",
            Bytes::from_static(b"MZ"),
        );
        let err = uploader.upload("c1", &exe).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.message(),
            "Only images (JPEG, PNG, GIF), PDFs, and text files are allowed"
        );
        assert!(puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_scopes_path_by_chat_and_keeps_the_extension() {
        let store = MockStore::new();
        let puts = store.puts.clone();
        let uploader = AttachmentUploader::new(store);

        let attachment = uploader.upload("c1", &png(16)).await.unwrap();
        assert_eq!(attachment.name, "photo.png");

        let puts = puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert!(puts[0].starts_with("c1/"), "path {} not chat-scoped", puts[0]);
        assert!(puts[0].ends_with(".png"), "path {} lost extension", puts[0]);
        assert_ne!(puts[0], "c1/photo.png", "file name should be randomized");
        assert!(attachment.url.ends_with(&puts[0]));
    }

    #[tokio::test]
    async fn policy_rejection_gets_the_administrator_message() {
        let store = MockStore::failing(Error::permission(
            "new row violates row-level security policy",
        ));
        let uploader = AttachmentUploader::new(store);

        let err = uploader.upload("c1", &png(16)).await.unwrap_err();
        assert!(err.is_permission());
        assert_eq!(err.message(), PERMISSION_DENIED_MESSAGE);
    }

    #[tokio::test]
    async fn other_upload_failures_surface_the_backend_message() {
        let store = MockStore::failing(Error::api(507, "insufficient storage"));
        let uploader = AttachmentUploader::new(store);

        let err = uploader.upload("c1", &png(16)).await.unwrap_err();
        assert_eq!(err.message(), "insufficient storage");
    }

    #[test]
    fn extension_to_content_type() {
        assert_eq!(content_type_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(content_type_for_extension("jpeg"), Some("image/jpeg"));
        assert_eq!(content_type_for_extension("png"), Some("image/png"));
        assert_eq!(content_type_for_extension("gif"), Some("image/gif"));
        assert_eq!(content_type_for_extension("pdf"), Some("application/pdf"));
        assert_eq!(content_type_for_extension("txt"), Some("text/plain"));
        assert_eq!(content_type_for_extension("exe"), None);
    }

    #[test]
    fn boundary_size_is_accepted_by_validation() {
        assert!(validate(&png(MAX_ATTACHMENT_BYTES)).is_ok());
        assert!(validate(&png(MAX_ATTACHMENT_BYTES + 1)).is_err());
    }
}
