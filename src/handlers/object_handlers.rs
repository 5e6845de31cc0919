//! HTTP handlers behind the signed object URLs.
//! Streams object bodies to avoid buffering in memory and delegates storage
//! concerns to `LocalObjectStorage`.

use crate::{
    errors::AppError,
    services::signing::SignedRequest,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;

/// Query parameters carried by every signed URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedQuery {
    pub expires: i64,
    pub sig: String,
    pub upload_id: Option<String>,
    pub part_number: Option<u32>,
}

impl SignedQuery {
    fn request<'a>(&'a self, method: &'a str, key: &'a str) -> SignedRequest<'a> {
        SignedRequest {
            method,
            key,
            upload_id: self.upload_id.as_deref(),
            part_number: self.part_number,
            expires: self.expires,
        }
    }
}

/// `PUT /objects/{*key}` - upload a whole object, or one part when
/// `uploadId` and `partNumber` are present.
pub async fn put_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedQuery>,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    state.storage.verify(&q.request("PUT", &key), &q.sig)?;

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let stored = match (q.upload_id.as_deref(), q.part_number) {
        (None, None) => state.storage.put_object_stream(&key, stream).await?,
        (Some(upload_id), Some(part_number)) => {
            state
                .storage
                .put_part_stream(&key, upload_id, part_number, stream)
                .await?
        }
        _ => {
            return Err(AppError::bad_request(
                "uploadId and partNumber must be given together",
            ));
        }
    };

    let mut resp_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", stored.etag)) {
        resp_headers.insert(header::ETAG, value);
    }
    Ok((StatusCode::OK, resp_headers))
}

/// `GET /objects/{*key}` as a streaming response.
pub async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Result<Response, AppError> {
    state.storage.verify(&q.request("GET", &key), &q.sig)?;

    let (size, file) = state.storage.get_object_reader(&key).await?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));

    Ok(response)
}
