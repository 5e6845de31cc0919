//! Post metadata persistence.
//!
//! [`MetadataStore`] is the capability the workflows depend on;
//! [`SqliteMetadataStore`] backs it with the `posts` table and its
//! `(owner, created_at)` index.

use crate::{
    errors::{PostError, PostResult},
    models::{keys::StoreKey, post::Post},
};
use async_trait::async_trait;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::{debug, error};

const POST_COLUMNS: &str = "post_id, owner, content_type, title, description, size_bytes, \
                            has_thumbnail, created_at, last_updated";

/// One slice of the user index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPage {
    /// Rows in index order (newest first).
    pub rows: Vec<Post>,
    /// True when the index holds further rows after the last one returned.
    pub has_more: bool,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Write a post row, replacing any row with the same identifier.
    async fn insert_post(&self, post: &Post) -> PostResult<()>;

    /// Fails with [`PostError::PostNotFound`] when absent.
    async fn get_post(&self, key: &StoreKey) -> PostResult<Post>;

    async fn delete_post(&self, key: &StoreKey) -> PostResult<()>;

    async fn batch_delete_posts(&self, keys: &[StoreKey]) -> PostResult<()>;

    /// Scan `owner`'s posts newest first, strictly after `start` when given.
    async fn query_by_index(
        &self,
        owner: &str,
        start: Option<&StoreKey>,
        limit: usize,
    ) -> PostResult<IndexPage>;

    /// Resolve many rows at once; absent ids are simply missing from the result.
    async fn batch_get_posts(&self, keys: &[StoreKey]) -> PostResult<Vec<Post>>;
}

/// SQLite-backed metadata store.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

fn validate_all(keys: &[StoreKey]) -> PostResult<()> {
    keys.iter().try_for_each(StoreKey::validate)
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_post(&self, post: &Post) -> PostResult<()> {
        StoreKey::post(&post.post_id).validate()?;
        sqlx::query(
            r#"
            INSERT INTO posts (
                post_id, owner, content_type, title, description, size_bytes,
                has_thumbnail, created_at, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(post_id) DO UPDATE SET
                owner = excluded.owner,
                content_type = excluded.content_type,
                title = excluded.title,
                description = excluded.description,
                size_bytes = excluded.size_bytes,
                has_thumbnail = excluded.has_thumbnail,
                created_at = excluded.created_at,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&post.post_id)
        .bind(&post.owner)
        .bind(&post.content_type)
        .bind(&post.title)
        .bind(&post.description)
        .bind(post.size_bytes)
        .bind(post.has_thumbnail)
        .bind(&post.created_at)
        .bind(&post.last_updated)
        .execute(&*self.db)
        .await
        .map_err(|err| {
            error!(post_id = %post.post_id, error = %err, "couldn't insert post row");
            PostError::Sqlx(err)
        })?;
        Ok(())
    }

    async fn get_post(&self, key: &StoreKey) -> PostResult<Post> {
        key.validate()?;
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE post_id = ?");
        sqlx::query_as::<_, Post>(&sql)
            .bind(key.post_id())
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => PostError::PostNotFound(key.post_id().to_string()),
                other => {
                    error!(post_id = %key.post_id(), error = %other, "couldn't read post row");
                    PostError::Sqlx(other)
                }
            })
    }

    async fn delete_post(&self, key: &StoreKey) -> PostResult<()> {
        key.validate()?;
        let result = sqlx::query("DELETE FROM posts WHERE post_id = ?")
            .bind(key.post_id())
            .execute(&*self.db)
            .await
            .map_err(|err| {
                error!(post_id = %key.post_id(), error = %err, "couldn't remove post row");
                PostError::Sqlx(err)
            })?;

        if result.rows_affected() == 0 {
            return Err(PostError::PostNotFound(key.post_id().to_string()));
        }
        Ok(())
    }

    async fn batch_delete_posts(&self, keys: &[StoreKey]) -> PostResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        validate_all(keys)?;

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM posts WHERE post_id IN (");
        let mut ids = builder.separated(", ");
        for key in keys {
            ids.push_bind(key.post_id());
        }
        builder.push(")");

        let result = builder.build().execute(&*self.db).await.map_err(|err| {
            error!(count = keys.len(), error = %err, "failed to batch delete post rows");
            PostError::Sqlx(err)
        })?;
        debug!(removed = result.rows_affected(), "batch deleted post rows");
        Ok(())
    }

    async fn query_by_index(
        &self,
        owner: &str,
        start: Option<&StoreKey>,
        limit: usize,
    ) -> PostResult<IndexPage> {
        if limit == 0 {
            return Err(PostError::validation("index query limit must be positive"));
        }
        let fetch_limit = limit + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE owner = "
        ));
        builder.push_bind(owner);

        if let Some(key) = start {
            key.validate()?;
            let StoreKey::UserIndex {
                owner: start_owner,
                created_at,
                post_id,
            } = key
            else {
                return Err(PostError::validation(
                    "index scans must start from a user index key",
                ));
            };
            if start_owner != owner {
                return Err(PostError::validation(format!(
                    "start key belongs to `{start_owner}`, not `{owner}`"
                )));
            }
            builder.push(" AND (created_at < ");
            builder.push_bind(created_at.clone());
            builder.push(" OR (created_at = ");
            builder.push_bind(created_at.clone());
            builder.push(" AND post_id < ");
            builder.push_bind(post_id.clone());
            builder.push("))");
        }

        builder.push(" ORDER BY created_at DESC, post_id DESC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<Post> = builder
            .build_query_as::<Post>()
            .fetch_all(&*self.db)
            .await
            .map_err(|err| {
                error!(username = %owner, error = %err, "couldn't query user index");
                PostError::Sqlx(err)
            })?;

        let has_more = rows.len() == fetch_limit;
        if has_more {
            rows.pop();
        }

        Ok(IndexPage { rows, has_more })
    }

    async fn batch_get_posts(&self, keys: &[StoreKey]) -> PostResult<Vec<Post>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        validate_all(keys)?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE post_id IN ("
        ));
        let mut ids = builder.separated(", ");
        for key in keys {
            ids.push_bind(key.post_id());
        }
        builder.push(")");

        builder
            .build_query_as::<Post>()
            .fetch_all(&*self.db)
            .await
            .map_err(|err| {
                error!(count = keys.len(), error = %err, "failed to batch get post rows");
                PostError::Sqlx(err)
            })
    }
}
