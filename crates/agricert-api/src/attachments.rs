//! Attachment object storage.
//!
//! Batch attachments are uploaded straight to object storage by clients;
//! the service only records metadata and hands out download links.
//! [`AttachmentStorage`] is the seam for a bucket backend that can presign
//! links; the built-in [`UnsignedLinkStorage`] cannot.

use std::time::Duration;

use async_trait::async_trait;

use agricert_core::{AgriError, Timestamp};

/// Requested lifetime of a download link.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    /// A download link for `key`, meant to stay usable for `expires_in`.
    /// Whether the lifetime is enforced is up to the backend.
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String, AgriError>;

    /// Remove the stored object. Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<(), AgriError>;
}

/// Plain links under `{object_base_url}/attachments/{key}` with an advisory
/// `expires` parameter. The links carry no signature and this service does
/// not serve them: whatever fronts the object store at that prefix
/// (gateway, CDN, bucket website) does. Deletion is logged only.
#[derive(Debug)]
pub struct UnsignedLinkStorage {
    base_url: String,
}

impl UnsignedLinkStorage {
    pub fn new(object_base_url: &str) -> Self {
        Self {
            base_url: object_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AttachmentStorage for UnsignedLinkStorage {
    async fn download_url(&self, key: &str, expires_in: Duration) -> Result<String, AgriError> {
        let ttl = i64::try_from(expires_in.as_secs())
            .map_err(|_| AgriError::invalid("download link lifetime out of range"))?;
        let expires = Timestamp::now().epoch_secs().saturating_add(ttl);
        Ok(format!("{}/attachments/{key}?expires={expires}", self.base_url))
    }

    async fn delete(&self, key: &str) -> Result<(), AgriError> {
        tracing::info!(storage_key = %key, "attachment object removal requested");
        Ok(())
    }
}

/// Storage double that remembers which objects were removed.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingStorage {
    deleted: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingStorage {
    pub(crate) fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl AttachmentStorage for RecordingStorage {
    async fn download_url(&self, key: &str, _expires_in: Duration) -> Result<String, AgriError> {
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), AgriError> {
        self.deleted.lock().push(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn link_carries_advisory_expiry() {
        let storage = UnsignedLinkStorage::new("http://localhost:3000/");
        let before = Timestamp::now().epoch_secs();
        let url = storage
            .download_url("batches/1/lab.pdf", DOWNLOAD_URL_TTL)
            .await
            .unwrap();
        let (path, expires) = url.split_once("?expires=").unwrap();
        assert_eq!(path, "http://localhost:3000/attachments/batches/1/lab.pdf");
        let expires: i64 = expires.parse().unwrap();
        assert!(expires >= before + 3600);
    }

    #[tokio::test]
    async fn deleting_unknown_object_is_ok() {
        let storage = UnsignedLinkStorage::new("http://x");
        storage.delete("batches/404/missing.pdf").await.unwrap();
    }
}
