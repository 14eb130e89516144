//! Batch attachments: metadata of documents stored in object storage.

use serde::{Deserialize, Serialize};

use agricert_core::{ActorId, AgriError, AttachmentId, BatchId, Timestamp};
use agricert_vc::AttachmentClaim;

/// Largest accepted upload, in bytes.
pub const MAX_ATTACHMENT_BYTES: i64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    pub id: AttachmentId,
    pub batch_id: BatchId,
    pub file_name: String,
    pub storage_key: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub uploaded_by: ActorId,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAttachment {
    pub file_name: Option<String>,
    pub storage_key: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
}

impl AttachmentRecord {
    pub fn create(
        id: AttachmentId,
        batch_id: BatchId,
        uploaded_by: ActorId,
        input: NewAttachment,
    ) -> Result<Self, AgriError> {
        let mut errors = Vec::new();
        let file_name = input.file_name.unwrap_or_default().trim().to_string();
        if file_name.is_empty() {
            errors.push("File name is required".to_string());
        }
        let storage_key = input.storage_key.unwrap_or_default().trim().to_string();
        if storage_key.is_empty() {
            errors.push("Storage key is required".to_string());
        }
        match input.file_size {
            Some(size) if size < 0 => errors.push("File size cannot be negative".to_string()),
            Some(size) if size > MAX_ATTACHMENT_BYTES => {
                errors.push("File size exceeds 10 MB limit".to_string())
            }
            _ => {}
        }
        if !errors.is_empty() {
            return Err(AgriError::Validation(errors));
        }
        Ok(Self {
            id,
            batch_id,
            file_name,
            storage_key,
            file_size: input.file_size,
            mime_type: input.mime_type,
            uploaded_by,
            created_at: Timestamp::now(),
        })
    }

    pub fn claim(&self) -> AttachmentClaim {
        AttachmentClaim {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            storage_key: self.storage_key.clone(),
        }
    }
}
