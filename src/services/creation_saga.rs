//! Two-phase post creation.
//!
//! `reserve` writes the metadata row and issues upload authorizations
//! concurrently; the client then uploads out-of-band and calls `confirm`
//! with its verdict. A cancelled reservation is compensated by deleting the
//! row. A confirmed one publishes `PostWasCreatedEvent`.

use crate::{
    errors::{PostError, PostResult},
    models::{
        event::DomainEvent,
        keys::StoreKey,
        post::{NewPost, Post},
        upload::{CompletionRecord, UploadAuthorization},
    },
    services::{
        event_publisher::EventPublisher,
        identifier::{generate_post_id, now_timestamp},
        metadata_store::MetadataStore,
        object_storage::AuthorizationProvider,
    },
};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{info, warn};

/// Result of a successful reservation.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReservedPost {
    pub post_id: String,
    #[serde(flatten)]
    pub authorization: UploadAuthorization,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed(Post),
    Cancelled { post_id: String },
}

pub struct CreatePostService {
    store: Arc<dyn MetadataStore>,
    auth: Arc<dyn AuthorizationProvider>,
    events: Arc<dyn EventPublisher>,
}

impl CreatePostService {
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

    /// Persist the post row and authorize its uploads.
    ///
    /// Both halves run as separate tasks and are joined before anything is
    /// returned. A failure in one does not undo the other.
    pub async fn reserve(&self, new_post: NewPost) -> PostResult<ReservedPost> {
        for (field, value) in [
            ("username", &new_post.owner),
            ("type", &new_post.content_type),
            ("title", &new_post.title),
        ] {
            if value.trim().is_empty() {
                return Err(PostError::validation(format!("{field} must not be empty")));
            }
        }

        let created_at = now_timestamp();
        let post_id = generate_post_id(&new_post.owner, &new_post.title, &created_at)?;
        let size_hint = new_post.size_bytes;
        let post = new_post.into_post(post_id.clone(), created_at);

        let store = Arc::clone(&self.store);
        let row = post.clone();
        let insert = tokio::spawn(async move { store.insert_post(&row).await });

        let auth = Arc::clone(&self.auth);
        let content_key = post.content_key();
        let thumbnail_key = post.has_thumbnail.then(|| post.thumbnail_key());
        let authorize = tokio::spawn(async move {
            authorize_upload(auth.as_ref(), &content_key, size_hint, thumbnail_key.as_deref())
                .await
        });

        let (inserted, authorized) = tokio::join!(insert, authorize);
        let inserted = inserted.map_err(task_failed).and_then(|res| res);
        let authorized = authorized.map_err(task_failed).and_then(|res| res);

        match (inserted, authorized) {
            (Ok(()), Ok(authorization)) => {
                info!(post_id = %post_id, username = %post.owner, multipart = authorization.is_multipart(), "post reserved");
                Ok(ReservedPost {
                    post_id,
                    authorization,
                })
            }
            (Err(err), Ok(_)) => {
                warn!(post_id = %post_id, error = %err, "metadata write failed; issued upload authorization is orphaned");
                Err(err)
            }
            (Ok(()), Err(err)) => {
                warn!(post_id = %post_id, error = %err, "upload authorization failed; metadata row is orphaned");
                Err(err)
            }
            (Err(err), Err(auth_err)) => {
                warn!(post_id = %post_id, error = %err, auth_error = %auth_err, "reservation failed on both sides");
                Err(err)
            }
        }
    }

    /// Apply the client's verdict on a reservation.
    pub async fn confirm(&self, record: CompletionRecord) -> PostResult<ConfirmOutcome> {
        let key = StoreKey::post(&record.post_id);
        key.validate()?;

        if !record.confirmed {
            self.store.delete_post(&key).await?;
            info!(post_id = %record.post_id, "reservation cancelled");
            return Ok(ConfirmOutcome::Cancelled {
                post_id: record.post_id,
            });
        }

        if record.is_multipart {
            if record.upload_id.trim().is_empty() {
                return Err(PostError::validation(
                    "multipart confirmation needs an upload id",
                ));
            }
            let reserved = self.store.get_post(&key).await?;
            self.auth
                .complete_multipart(
                    &reserved.content_key(),
                    &record.upload_id,
                    &record.completed_parts,
                )
                .await?;
        }

        let post = self.store.get_post(&key).await?;
        self.events
            .publish(&DomainEvent::post_was_created(post.clone()))
            .await?;
        info!(post_id = %post.post_id, username = %post.owner, "post confirmed");
        Ok(ConfirmOutcome::Confirmed(post))
    }
}

async fn authorize_upload(
    auth: &dyn AuthorizationProvider,
    content_key: &str,
    size_hint: u64,
    thumbnail_key: Option<&str>,
) -> PostResult<UploadAuthorization> {
    let content = auth.get_write_authorizations(content_key, size_hint).await?;

    let thumbnail_url = match thumbnail_key {
        // Thumbnails are always a single write.
        Some(key) => auth
            .get_write_authorizations(key, 0)
            .await?
            .urls
            .into_iter()
            .next()
            .ok_or_else(|| PostError::store(format!("no write url issued for {key}")))?,
        None => String::new(),
    };

    Ok(UploadAuthorization {
        upload_id: content.upload_id.unwrap_or_default(),
        content_urls: content.urls,
        thumbnail_url,
    })
}

fn task_failed(err: JoinError) -> PostError {
    PostError::store(format!("reservation task failed: {err}"))
}
