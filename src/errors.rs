use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Failures surfaced by the post workflows and their collaborators.
#[derive(Debug, Error)]
pub enum PostError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("post `{0}` not found")]
    PostNotFound(String),
    #[error("posts not found: {}", .0.join(", "))]
    PostsNotFound(Vec<String>),
    #[error("multipart upload `{0}` not found")]
    UploadNotFound(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("publishing `{event}` failed: {reason}")]
    Publish { event: String, reason: String },
    #[error("signature rejected: {0}")]
    Signature(String),
}

pub type PostResult<T> = Result<T, PostError>;

impl PostError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// True for every "referenced thing is absent" variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PostNotFound(_)
                | Self::PostsNotFound(_)
                | Self::UploadNotFound(_)
                | Self::ObjectNotFound(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Signature(_) => StatusCode::FORBIDDEN,
            Self::Publish { .. } => StatusCode::BAD_GATEWAY,
            err if err.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<PostError> for AppError {
    fn from(err: PostError) -> Self {
        let status = err.status();
        // Collaborator details stay in the logs for 5xx responses.
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
            let message = status.canonical_reason().unwrap_or("request failed");
            return AppError::new(status, message.to_lowercase());
        }
        AppError::new(status, err.to_string())
    }
}
