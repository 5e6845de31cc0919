//! Batch deletion of a user's posts.

use crate::{
    errors::{PostError, PostResult},
    models::{event::DomainEvent, keys::StoreKey, post::Post},
    services::{
        event_publisher::EventPublisher, metadata_store::MetadataStore,
        object_storage::AuthorizationProvider,
    },
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::{info, warn};

pub struct DeletePostService {
    store: Arc<dyn MetadataStore>,
    auth: Arc<dyn AuthorizationProvider>,
    events: Arc<dyn EventPublisher>,
}

impl DeletePostService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        auth: Arc<dyn AuthorizationProvider>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            auth,
            events,
        }
    }

    /// Delete `post_ids` belonging to `owner`: objects first, then rows,
    /// then `PostsWereDeletedEvent`.
    ///
    /// Nothing is touched unless every id resolves to one of `owner`'s posts.
    /// Returns the de-duplicated ids that were deleted.
    pub async fn delete_posts(&self, owner: &str, post_ids: &[String]) -> PostResult<Vec<String>> {
        if owner.trim().is_empty() {
            return Err(PostError::validation("username must not be empty"));
        }
        if post_ids.is_empty() {
            return Err(PostError::validation("no post ids given"));
        }

        let mut seen = HashSet::new();
        let ids: Vec<String> = post_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        let keys: Vec<StoreKey> = ids.iter().map(StoreKey::post).collect();

        let found = self.store.batch_get_posts(&keys).await?;
        let owned: HashMap<&str, &Post> = found
            .iter()
            .filter(|p| p.owner == owner)
            .map(|p| (p.post_id.as_str(), p))
            .collect();

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !owned.contains_key(id.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            warn!(username = %owner, missing = ?missing, "refusing to delete unknown posts");
            return Err(PostError::PostsNotFound(missing));
        }

        let mut object_keys = Vec::with_capacity(ids.len() * 2);
        for id in &ids {
            // Every id resolved above.
            if let Some(post) = owned.get(id.as_str()) {
                object_keys.push(post.content_key());
                if post.has_thumbnail {
                    object_keys.push(post.thumbnail_key());
                }
            }
        }

        self.auth.delete_objects(&object_keys).await?;
        self.store.batch_delete_posts(&keys).await?;
        self.events
            .publish(&DomainEvent::posts_were_deleted(owner, ids.clone()))
            .await?;

        info!(username = %owner, count = ids.len(), objects = object_keys.len(), "posts deleted");
        Ok(ids)
    }
}
