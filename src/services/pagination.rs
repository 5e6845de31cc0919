//! Cursor-driven listing of a user's posts with download URLs.

use crate::{
    errors::{PostError, PostResult},
    models::{cursor::PaginationCursor, keys::StoreKey, post::Post},
    services::{metadata_store::MetadataStore, object_storage::AuthorizationProvider},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// Download URLs for one listed post.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostUrls {
    pub post_id: String,
    pub url: String,
    /// Empty when the post has no thumbnail or its URL could not be issued.
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPage {
    pub items: Vec<PostUrls>,
    /// Present only while more rows remain.
    pub next_cursor: Option<PaginationCursor>,
}

pub struct PostListingService {
    store: Arc<dyn MetadataStore>,
    auth: Arc<dyn AuthorizationProvider>,
}

impl PostListingService {
    pub fn new(store: Arc<dyn MetadataStore>, auth: Arc<dyn AuthorizationProvider>) -> Self {
        Self { store, auth }
    }

    /// One page of `owner`'s posts, newest first.
    ///
    /// Rows whose content URL cannot be issued are skipped; the cursor still
    /// advances past them.
    pub async fn get_user_posts(
        &self,
        owner: &str,
        cursor: Option<&PaginationCursor>,
        limit: usize,
    ) -> PostResult<PostPage> {
        if owner.trim().is_empty() {
            return Err(PostError::validation("username must not be empty"));
        }
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let start = cursor.map(|c| StoreKey::after_cursor(owner, c));

        // A store may hand the cursor row back first; one extra row keeps
        // the page full when it does.
        let fetch_limit = if cursor.is_some() { limit + 1 } else { limit };
        let page = self
            .store
            .query_by_index(owner, start.as_ref(), fetch_limit)
            .await?;

        let mut rows = page.rows;
        if let (Some(cursor), Some(first)) = (cursor, rows.first()) {
            if is_boundary(first, cursor) {
                debug!(username = %owner, post_id = %first.post_id, "dropping echoed boundary row");
                rows.remove(0);
            }
        }
        let mut has_more = page.has_more;
        if rows.len() > limit {
            rows.truncate(limit);
            has_more = true;
        }

        let last_seen = rows
            .last()
            .map(|p| PaginationCursor::new(&p.post_id, &p.created_at));

        let mut items = Vec::with_capacity(rows.len());
        for post in &rows {
            if let Some(urls) = self.resolve_urls(post).await {
                items.push(urls);
            }
        }

        let next_cursor = match last_seen {
            _ if !has_more => None,
            Some(next) if cursor != Some(&next) => Some(next),
            _ => {
                // Only reachable when a store reports more rows but returns none.
                warn!(username = %owner, "index did not advance past cursor; ending listing");
                None
            }
        };

        Ok(PostPage { items, next_cursor })
    }

    async fn resolve_urls(&self, post: &Post) -> Option<PostUrls> {
        let url = match self.auth.get_read_authorization(&post.content_key()).await {
            Ok(url) => url,
            Err(err) => {
                error!(post_id = %post.post_id, error = %err, "skipping post without read authorization");
                return None;
            }
        };

        let thumbnail_url = if post.has_thumbnail {
            self.auth
                .get_read_authorization(&post.thumbnail_key())
                .await
                .unwrap_or_else(|err| {
                    warn!(post_id = %post.post_id, error = %err, "thumbnail read authorization failed");
                    String::new()
                })
        } else {
            String::new()
        };

        Some(PostUrls {
            post_id: post.post_id.clone(),
            url,
            thumbnail_url,
        })
    }
}

fn is_boundary(post: &Post, cursor: &PaginationCursor) -> bool {
    post.post_id == cursor.last_id && post.created_at == cursor.last_created_at
}
