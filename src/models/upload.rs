//! Upload authorizations handed out at reservation and the completion
//! record clients send back.

use serde::{Deserialize, Serialize};

/// What the authorization provider returns for one object key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteAuthorization {
    /// Set only when the write was split into a multipart upload.
    pub upload_id: Option<String>,
    /// One URL for a single write, one per part (in part order) otherwise.
    pub urls: Vec<String>,
}

/// Everything a client needs to upload a reserved post.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadAuthorization {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub upload_id: String,
    pub content_urls: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thumbnail_url: String,
}

impl UploadAuthorization {
    pub fn is_multipart(&self) -> bool {
        !self.upload_id.is_empty()
    }
}

/// One uploaded part as reported by the client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,
    /// Integrity tag the object store returned for the part upload.
    #[serde(rename = "eTag", alias = "etag")]
    pub e_tag: String,
}

/// Client's verdict on a reserved post.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    #[serde(alias = "isConfirmed")]
    pub confirmed: bool,
    pub post_id: String,
    #[serde(default)]
    pub is_multipart: bool,
    #[serde(default)]
    pub upload_id: String,
    #[serde(default)]
    pub completed_parts: Vec<CompletedPart>,
}
