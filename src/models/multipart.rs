//! Represents multipart upload sessions opened by the local object storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A multipart upload session, initiated when a reserved post is too large
/// for a single write.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MultipartUpload {
    /// Unique upload ID (returned to client).
    pub upload_id: String,

    /// Object key being uploaded.
    pub object_key: String,

    /// Timestamp when upload was initiated.
    pub initiated_at: DateTime<Utc>,

    /// Whether upload has been completed successfully.
    pub completed: bool,
}
