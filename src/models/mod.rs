//! Core data models for the post service.
//!
//! Posts map to the `posts` table via `sqlx::FromRow` and serialize as the
//! camelCase JSON the clients exchange. Everything else here is ephemeral:
//! it lives for one request or one event.

pub mod cursor;
pub mod event;
pub mod keys;
pub mod multipart;
pub mod post;
pub mod upload;
