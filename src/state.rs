//! Shared application state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        creation_saga::CreatePostService,
        deletion::DeletePostService,
        event_publisher::{EventPublisher, OutboxEventPublisher},
        metadata_store::{MetadataStore, SqliteMetadataStore},
        object_storage::{AuthorizationProvider, LocalObjectStorage, UploadSettings},
        pagination::PostListingService,
        signing::UrlSigner,
    },
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub storage: Arc<LocalObjectStorage>,
    pub create: Arc<CreatePostService>,
    pub listing: Arc<PostListingService>,
    pub deletion: Arc<DeletePostService>,
}

impl AppState {
    /// Wire the SQLite/disk collaborators into the post workflows.
    pub fn new(
        db: Arc<SqlitePool>,
        storage_dir: impl Into<PathBuf>,
        signer: UrlSigner,
        settings: UploadSettings,
    ) -> Self {
        let storage = Arc::new(LocalObjectStorage::new(
            db.clone(),
            storage_dir,
            signer,
            settings,
        ));
        let store: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(db.clone()));
        let auth: Arc<dyn AuthorizationProvider> = storage.clone();
        let events: Arc<dyn EventPublisher> = Arc::new(OutboxEventPublisher::new(db.clone()));

        Self {
            create: Arc::new(CreatePostService::new(
                store.clone(),
                auth.clone(),
                events.clone(),
            )),
            listing: Arc::new(PostListingService::new(store.clone(), auth.clone())),
            deletion: Arc::new(DeletePostService::new(store, auth, events)),
            storage,
            db,
        }
    }

    pub fn from_config(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        Self::new(
            db,
            &cfg.storage_dir,
            UrlSigner::new(cfg.signing_secret_or_random()),
            UploadSettings {
                public_url: cfg.public_url.clone(),
                url_ttl: cfg.presign_ttl,
                multipart_threshold: cfg.multipart_threshold,
                part_size: cfg.part_size,
            },
        )
    }
}
