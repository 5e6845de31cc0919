//! Represents a published (or reserved) post and the keys derived from it.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Namespace segment separating thumbnail objects from primary content.
pub const THUMBNAILS_SEGMENT: &str = "THUMBNAILS";

/// Post metadata as persisted in the metadata store.
///
/// The identifier is always derived server-side; `created_at` and
/// `last_updated` use the fixed-precision layout from
/// [`crate::services::identifier::TIMESTAMP_LAYOUT`].
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub post_id: String,

    /// Owning user.
    #[serde(rename = "username")]
    pub owner: String,

    /// Content category ("image", "video", ...), part of every object key.
    #[serde(rename = "type")]
    pub content_type: String,

    pub title: String,

    pub description: String,

    #[serde(rename = "size")]
    pub size_bytes: i64,

    pub has_thumbnail: bool,

    pub created_at: String,

    pub last_updated: String,
}

impl Post {
    /// Object-store key of the primary content.
    pub fn content_key(&self) -> String {
        content_key(&self.owner, &self.content_type, &self.post_id)
    }

    /// Object-store key of the thumbnail, namespaced beside the content.
    pub fn thumbnail_key(&self) -> String {
        thumbnail_key(&self.owner, &self.content_type, &self.post_id)
    }
}

pub fn content_key(owner: &str, content_type: &str, post_id: &str) -> String {
    format!("{owner}/{content_type}/{post_id}")
}

pub fn thumbnail_key(owner: &str, content_type: &str, post_id: &str) -> String {
    format!("{owner}/{content_type}/{THUMBNAILS_SEGMENT}/{post_id}")
}

/// Client-supplied attributes of a post about to be reserved.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    #[serde(rename = "username")]
    pub owner: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub has_thumbnail: bool,
}

impl NewPost {
    /// Stamp identity and timestamps onto the client attributes.
    pub fn into_post(self, post_id: String, created_at: String) -> Post {
        Post {
            post_id,
            owner: self.owner,
            content_type: self.content_type,
            title: self.title,
            description: self.description,
            size_bytes: i64::try_from(self.size_bytes).unwrap_or(i64::MAX),
            has_thumbnail: self.has_thumbnail,
            last_updated: created_at.clone(),
            created_at,
        }
    }
}
