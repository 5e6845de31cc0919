//! HTTP handlers for the post workflows: reserve, confirm/cancel, list and
//! delete. Request validation that is purely about the HTTP shape (limits,
//! cursor tokens) lives here; everything else is delegated to the services.

use crate::{
    errors::AppError,
    models::{cursor::PaginationCursor, post::NewPost, upload::CompletionRecord},
    services::{
        creation_saga::{ConfirmOutcome, ReservedPost},
        pagination::{DEFAULT_PAGE_SIZE, PostUrls},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsResponse {
    pub posts: Vec<PostUrls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub post_id: String,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePostsRequest {
    pub post_ids: Vec<String>,
}

/// `POST /posts` - reserve a post and hand out upload URLs.
pub async fn create_post(
    State(state): State<AppState>,
    Json(new_post): Json<NewPost>,
) -> Result<Json<ReservedPost>, AppError> {
    let reserved = state.create.reserve(new_post).await?;
    Ok(Json(reserved))
}

/// `POST /posts/confirmation` - confirm or cancel a reservation.
pub async fn confirm_post(
    State(state): State<AppState>,
    Json(record): Json<CompletionRecord>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let response = match state.create.confirm(record).await? {
        ConfirmOutcome::Confirmed(post) => ConfirmResponse {
            post_id: post.post_id,
            status: "confirmed",
        },
        ConfirmOutcome::Cancelled { post_id } => ConfirmResponse {
            post_id,
            status: "cancelled",
        },
    };
    Ok(Json(response))
}

/// `GET /user-posts/{username}?cursor=&limit=`
pub async fn list_user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(q): Query<ListPostsQuery>,
) -> Result<Json<ListPostsResponse>, AppError> {
    let limit = match q.limit {
        None => DEFAULT_PAGE_SIZE,
        Some(n) if n <= 0 => return Err(AppError::bad_request("limit must be positive")),
        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
    };
    let cursor = q
        .cursor
        .as_deref()
        .filter(|token| !token.is_empty())
        .map(PaginationCursor::decode)
        .transpose()?;

    let page = state
        .listing
        .get_user_posts(&username, cursor.as_ref(), limit)
        .await?;

    Ok(Json(ListPostsResponse {
        posts: page.items,
        next_cursor: page.next_cursor.map(|c| c.encode()),
    }))
}

/// `DELETE /user-posts/{username}` with `{ "postIds": [...] }`.
pub async fn delete_user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(req): Json<DeletePostsRequest>,
) -> Result<StatusCode, AppError> {
    state.deletion.delete_posts(&username, &req.post_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}
