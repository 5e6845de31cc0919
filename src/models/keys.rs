//! Key shapes accepted by the metadata store.

use crate::{
    errors::{PostError, PostResult},
    models::cursor::PaginationCursor,
    services::identifier::parse_timestamp,
};

/// The closed set of keys the metadata store understands.
///
/// Point operations address a row by `PostId`; index scans start after a
/// `UserIndex` position. Both shapes are checked by [`StoreKey::validate`]
/// before they reach SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
    PostId(String),
    UserIndex {
        owner: String,
        created_at: String,
        post_id: String,
    },
}

impl StoreKey {
    pub fn post(id: impl Into<String>) -> Self {
        Self::PostId(id.into())
    }

    /// Index position just after `cursor` for `owner`.
    pub fn after_cursor(owner: &str, cursor: &PaginationCursor) -> Self {
        Self::UserIndex {
            owner: owner.to_string(),
            created_at: cursor.last_created_at.clone(),
            post_id: cursor.last_id.clone(),
        }
    }

    /// Primary identifier of the row this key points at.
    pub fn post_id(&self) -> &str {
        match self {
            Self::PostId(id) => id,
            Self::UserIndex { post_id, .. } => post_id,
        }
    }

    pub fn validate(&self) -> PostResult<()> {
        match self {
            Self::PostId(id) => non_empty("post id", id),
            Self::UserIndex {
                owner,
                created_at,
                post_id,
            } => {
                non_empty("owner", owner)?;
                non_empty("post id", post_id)?;
                parse_timestamp(created_at).map(|_| ())
            }
        }
    }
}

fn non_empty(what: &str, value: &str) -> PostResult<()> {
    if value.trim().is_empty() {
        return Err(PostError::validation(format!("{what} must not be empty")));
    }
    Ok(())
}
