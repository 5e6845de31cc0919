//! Defines routes for the post workflows and the signed object endpoints.
//!
//! ## Structure
//! - **Post endpoints**
//!   - `POST   /posts` - reserve a post, returns upload URLs
//!   - `POST   /posts/confirmation` - confirm or cancel a reservation
//!   - `GET    /user-posts/{username}` - list posts (supports cursor, limit)
//!   - `DELETE /user-posts/{username}` - batch delete posts
//!
//! - **Object endpoints** (reached through signed URLs only)
//!   - `PUT    /objects/{*key}` - upload an object or one multipart part
//!   - `GET    /objects/{*key}` - download an object
//!
//! The wildcard `*key` allows nested keys like `alice/image/THUMBNAILS/p1`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, put_object},
        post_handlers::{confirm_post, create_post, delete_user_posts, list_user_posts},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router for every endpoint, carrying `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // post workflows
        .route("/posts", post(create_post))
        .route("/posts/confirmation", post(confirm_post))
        .route(
            "/user-posts/{username}",
            get(list_user_posts).delete(delete_user_posts),
        )
        // signed object access
        .route("/objects/{*key}", put(put_object).get(get_object))
}
