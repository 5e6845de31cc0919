//! src/services/object_storage.rs
//!
//! Upload/download authorization and the local object store behind it.
//!
//! [`AuthorizationProvider`] is what the post workflows see: it hands out
//! time-boxed URLs, reconciles multipart uploads and deletes objects.
//! [`LocalObjectStorage`] implements it on local disk, sharded beneath
//! `base_path/{shard}/{shard}/{key}`, and serves the signed URLs itself
//! through the `/objects/{*key}` routes. Multipart sessions are tracked in
//! SQLite; their parts are staged under `base_path/.multipart/{upload_id}`
//! until completion concatenates them.

use crate::{
    errors::{PostError, PostResult},
    models::{
        multipart::MultipartUpload,
        upload::{CompletedPart, WriteAuthorization},
    },
    services::signing::{SignedRequest, UrlSigner},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, error, info};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_PARTS: u64 = 10_000;
const STAGING_DIR: &str = ".multipart";

#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// One write URL, or a multipart session with one URL per part when
    /// `size_hint` is above the multipart threshold.
    async fn get_write_authorizations(
        &self,
        key: &str,
        size_hint: u64,
    ) -> PostResult<WriteAuthorization>;

    async fn get_read_authorization(&self, key: &str) -> PostResult<String>;

    /// Stitch the uploaded parts of `upload_id` into the object at `key`.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> PostResult<()>;

    /// Remove objects; keys that do not exist are ignored.
    async fn delete_objects(&self, keys: &[String]) -> PostResult<()>;
}

/// How URLs are minted and how large writes are split.
#[derive(Clone, Debug)]
pub struct UploadSettings {
    /// Externally reachable base URL of this service.
    pub public_url: String,
    pub url_ttl: Duration,
    /// Writes strictly larger than this become multipart uploads.
    pub multipart_threshold: u64,
    pub part_size: u64,
}

/// Outcome of a streamed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub size_bytes: u64,
    /// Hex MD5 of the bytes written.
    pub etag: String,
}

/// Disk-backed object store that issues and honours signed URLs.
#[derive(Clone)]
pub struct LocalObjectStorage {
    /// Shared SQLite connection pool used for multipart sessions.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    signer: UrlSigner,
    settings: UploadSettings,
}

impl LocalObjectStorage {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        signer: UrlSigner,
        settings: UploadSettings,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            signer,
            settings,
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin with `/`, contain `.` or `..` path segments,
    /// or reach into the staging area. Dots inside a segment are fine.
    fn ensure_key_safe(&self, key: &str) -> PostResult<()> {
        let invalid = |reason: &str| Err(PostError::validation(format!("object key {reason}")));
        if key.is_empty() {
            return invalid("is empty");
        }
        if key.len() > MAX_OBJECT_KEY_LEN {
            return invalid("is too long");
        }
        let mut segments = key.split('/');
        if key.starts_with('/')
            || segments.clone().next() == Some(STAGING_DIR)
            || segments.any(|s| s == "." || s == "..")
        {
            return invalid("escapes the storage root");
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return invalid("contains control characters");
        }
        Ok(())
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Combines base_path/{shard}/{shard}/{key}. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(STAGING_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.staging_dir(upload_id)
            .join(format!("{:05}", part_number))
    }

    fn signed_url(
        &self,
        method: &str,
        key: &str,
        upload_id: Option<&str>,
        part_number: Option<u32>,
    ) -> PostResult<String> {
        let ttl = i64::try_from(self.settings.url_ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl);
        let request = SignedRequest {
            method,
            key,
            upload_id,
            part_number,
            expires,
        };
        let sig = self.signer.sign(&request)?;

        let mut url = format!(
            "{}/objects/{}?expires={expires}&sig={sig}",
            self.settings.public_url.trim_end_matches('/'),
            encode_key_path(key)
        );
        if let (Some(upload_id), Some(part_number)) = (upload_id, part_number) {
            url.push_str(&format!("&uploadId={upload_id}&partNumber={part_number}"));
        }
        Ok(url)
    }

    /// Check an incoming signed request against this store's secret.
    pub fn verify(&self, request: &SignedRequest<'_>, signature: &str) -> PostResult<()> {
        self.ensure_key_safe(request.key)?;
        self.signer.verify(request, signature)
    }

    /// Fetch a multipart session row.
    async fn fetch_upload(&self, upload_id: &str) -> PostResult<MultipartUpload> {
        sqlx::query_as::<_, MultipartUpload>(
            "SELECT upload_id, object_key, initiated_at, completed
             FROM multipart_uploads WHERE upload_id = ?",
        )
        .bind(upload_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => PostError::UploadNotFound(upload_id.to_string()),
            other => PostError::Sqlx(other),
        })
    }

    /// Fetch a session that is still open for `key`.
    async fn fetch_open_upload(&self, key: &str, upload_id: &str) -> PostResult<MultipartUpload> {
        let upload = self.fetch_upload(upload_id).await?;
        if upload.completed {
            return Err(PostError::UploadNotFound(upload_id.to_string()));
        }
        if upload.object_key != key {
            return Err(PostError::validation(format!(
                "upload `{upload_id}` does not belong to `{key}`"
            )));
        }
        Ok(upload)
    }

    /// Stream-upload a whole object to disk.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Atomically renames into final location.
    pub async fn put_object_stream<S>(&self, key: &str, stream: S) -> PostResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let stored = write_stream(&self.object_path(key), stream).await?;
        debug!(key, size = stored.size_bytes, "stored object");
        Ok(stored)
    }

    /// Stream one part of an open multipart upload into the staging area.
    pub async fn put_part_stream<S>(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        stream: S,
    ) -> PostResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        if part_number == 0 || u64::from(part_number) > MAX_PARTS {
            return Err(PostError::validation(format!(
                "part number {part_number} out of range"
            )));
        }
        self.fetch_open_upload(key, upload_id).await?;

        let stored = write_stream(&self.part_path(upload_id, part_number), stream).await?;
        debug!(key, upload_id, part_number, "stored part");
        Ok(stored)
    }

    /// Open an object for reading.
    ///
    /// Returns its size and a File handle ready for streaming out.
    pub async fn get_object_reader(&self, key: &str) -> PostResult<(u64, File)> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                PostError::ObjectNotFound(key.to_string())
            } else {
                PostError::Io(err)
            }
        })?;
        let size = file.metadata().await?.len();
        Ok((size, file))
    }

    /// Concatenate staged parts into `target`, checking each part's etag.
    async fn assemble_parts(
        &self,
        upload_id: &str,
        parts: &[CompletedPart],
        target: &mut File,
    ) -> PostResult<()> {
        let mut buf = vec![0u8; 64 * 1024];
        for part in parts {
            let path = self.part_path(upload_id, part.part_number);
            let mut source = File::open(&path).await.map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    PostError::validation(format!("part {} was never uploaded", part.part_number))
                } else {
                    PostError::Io(err)
                }
            })?;

            let mut digest = Context::new();
            loop {
                let read = source.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                digest.consume(&buf[..read]);
                target.write_all(&buf[..read]).await?;
            }

            let actual = format!("{:x}", digest.compute());
            if actual != part.e_tag.trim_matches('"') {
                return Err(PostError::validation(format!(
                    "part {} etag mismatch",
                    part.part_number
                )));
            }
        }
        target.flush().await?;
        target.sync_all().await?;
        Ok(())
    }

    /// Recursively remove empty directories up to the storage root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path) {
        let stop = self.base_path.as_path();
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl AuthorizationProvider for LocalObjectStorage {
    async fn get_write_authorizations(
        &self,
        key: &str,
        size_hint: u64,
    ) -> PostResult<WriteAuthorization> {
        self.ensure_key_safe(key)?;
        if size_hint <= self.settings.multipart_threshold {
            let url = self.signed_url("PUT", key, None, None)?;
            return Ok(WriteAuthorization {
                upload_id: None,
                urls: vec![url],
            });
        }

        let part_count = size_hint.div_ceil(self.settings.part_size.max(1));
        if part_count > MAX_PARTS {
            return Err(PostError::validation(format!(
                "{size_hint} bytes needs {part_count} parts, more than {MAX_PARTS}"
            )));
        }

        let upload_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO multipart_uploads (upload_id, object_key, initiated_at, completed)
             VALUES (?, ?, ?, 0)",
        )
        .bind(&upload_id)
        .bind(key)
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        .map_err(|err| {
            error!(key, error = %err, "failed to initiate multipart upload");
            PostError::Sqlx(err)
        })?;
        info!(key, upload_id = %upload_id, parts = part_count, "multipart upload initiated");

        let urls = (1..=part_count as u32)
            .map(|part| self.signed_url("PUT", key, Some(&upload_id), Some(part)))
            .collect::<PostResult<Vec<_>>>()?;

        Ok(WriteAuthorization {
            upload_id: Some(upload_id),
            urls,
        })
    }

    async fn get_read_authorization(&self, key: &str) -> PostResult<String> {
        self.ensure_key_safe(key)?;
        self.signed_url("GET", key, None, None)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> PostResult<()> {
        self.ensure_key_safe(key)?;
        self.fetch_open_upload(key, upload_id).await?;

        if parts.is_empty() {
            return Err(PostError::validation("completion needs at least one part"));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(PostError::validation(
                "parts must be listed in strictly ascending order",
            ));
        }

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            PostError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        if let Err(err) = self.assemble_parts(upload_id, parts, &mut file).await {
            let _ = fs::remove_file(&tmp_path).await;
            error!(key, upload_id, error = %err, "failed to complete multipart upload");
            return Err(err);
        }
        drop(file);
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PostError::Io(err));
        }

        sqlx::query("UPDATE multipart_uploads SET completed = 1 WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;

        if let Err(err) = fs::remove_dir_all(self.staging_dir(upload_id)).await {
            debug!(upload_id, "failed to remove staged parts: {}", err);
        }
        info!(key, upload_id, parts = parts.len(), "multipart upload completed");
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> PostResult<()> {
        for key in keys {
            self.ensure_key_safe(key)?;
        }
        for key in keys {
            let file_path = self.object_path(key);
            match fs::remove_file(&file_path).await {
                Ok(_) => debug!("removed physical file {}", file_path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("file {} already missing", file_path.display());
                }
                Err(err) => {
                    error!(key = %key, error = %err, "failed to delete object");
                    return Err(PostError::Io(err));
                }
            }
            if let Some(parent) = file_path.parent() {
                self.prune_empty_dirs(parent).await;
            }
        }
        Ok(())
    }
}

/// Write `stream` to `file_path` through a temp file, returning size and MD5.
///
/// Ensures durable writes (fsync) and cleans up temp files on errors.
async fn write_stream<S>(file_path: &Path, stream: S) -> PostResult<StoredObject>
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
        PostError::Io(io::Error::new(
            ErrorKind::Other,
            "object path missing parent directory",
        ))
    })?;
    fs::create_dir_all(&parent).await?;
    let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
    let mut file = File::create(&tmp_path).await?;

    let mut size_bytes: u64 = 0;
    let mut digest = Context::new();
    pin_mut!(stream);
    while let Some(chunk_res) = stream.next().await {
        let chunk = match chunk_res {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(PostError::Io(err));
            }
        };
        size_bytes += chunk.len() as u64;
        digest.consume(&chunk);
        if let Err(err) = file.write_all(&chunk).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(PostError::Io(err));
        }
    }
    if let Err(err) = file.flush().await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(PostError::Io(err));
    }
    if let Err(err) = file.sync_all().await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(PostError::Io(err));
    }

    if let Err(err) = fs::rename(&tmp_path, file_path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(PostError::Io(err));
    }

    Ok(StoredObject {
        size_bytes,
        etag: format!("{:x}", digest.compute()),
    })
}

/// Percent-encode a key for use as a URL path, keeping `/` separators.
fn encode_key_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use tempfile::TempDir;

    async fn storage(threshold: u64, part_size: u64) -> (LocalObjectStorage, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalObjectStorage::new(
            test_pool().await,
            dir.path(),
            UrlSigner::new("test-secret"),
            UploadSettings {
                public_url: "http://localhost:3000/".into(),
                url_ttl: Duration::from_secs(60),
                multipart_threshold: threshold,
                part_size,
            },
        );
        (storage, dir)
    }

    fn body(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    fn md5_hex(data: &[u8]) -> String {
        format!("{:x}", md5::compute(data))
    }

    #[tokio::test]
    async fn small_writes_get_a_single_signed_url() {
        let (storage, _dir) = storage(100, 100).await;
        let auth = storage
            .get_write_authorizations("alice/image/a b", 100)
            .await
            .unwrap();

        assert_eq!(auth.upload_id, None);
        assert_eq!(auth.urls.len(), 1);
        assert!(
            auth.urls[0].starts_with("http://localhost:3000/objects/alice/image/a%20b?expires=")
        );
        assert!(auth.urls[0].contains("&sig="));
    }

    #[tokio::test]
    async fn large_writes_open_a_multipart_session() {
        let (storage, _dir) = storage(100, 100).await;
        let auth = storage
            .get_write_authorizations("alice/video/p1", 250)
            .await
            .unwrap();

        let upload_id = auth.upload_id.clone().unwrap();
        assert_eq!(auth.urls.len(), 3);
        for (i, url) in auth.urls.iter().enumerate() {
            assert!(url.ends_with(&format!("&uploadId={upload_id}&partNumber={}", i + 1)));
        }
        let session = storage.fetch_upload(&upload_id).await.unwrap();
        assert_eq!(session.object_key, "alice/video/p1");
        assert!(!session.completed);
    }

    #[tokio::test]
    async fn completes_multipart_upload_in_part_order() {
        let (storage, _dir) = storage(4, 4).await;
        let key = "alice/video/p1";
        let upload_id = storage
            .get_write_authorizations(key, 8)
            .await
            .unwrap()
            .upload_id
            .unwrap();

        let second = storage
            .put_part_stream(key, &upload_id, 2, body(b"5678"))
            .await
            .unwrap();
        let first = storage
            .put_part_stream(key, &upload_id, 1, body(b"1234"))
            .await
            .unwrap();
        assert_eq!(first.etag, md5_hex(b"1234"));

        let parts = vec![
            CompletedPart {
                part_number: 1,
                e_tag: format!("\"{}\"", first.etag),
            },
            CompletedPart {
                part_number: 2,
                e_tag: second.etag,
            },
        ];
        storage
            .complete_multipart(key, &upload_id, &parts)
            .await
            .unwrap();

        let (size, mut file) = storage.get_object_reader(key).await.unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).await.unwrap();
        assert_eq!(size, 8);
        assert_eq!(content, "12345678");
        assert!(!storage.staging_dir(&upload_id).exists());

        assert!(matches!(
            storage.complete_multipart(key, &upload_id, &parts).await,
            Err(PostError::UploadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_mismatched_or_missing_parts() {
        let (storage, _dir) = storage(4, 4).await;
        let key = "alice/video/p1";
        let upload_id = storage
            .get_write_authorizations(key, 8)
            .await
            .unwrap()
            .upload_id
            .unwrap();
        storage
            .put_part_stream(key, &upload_id, 1, body(b"1234"))
            .await
            .unwrap();

        let wrong_tag = [CompletedPart {
            part_number: 1,
            e_tag: md5_hex(b"nope"),
        }];
        assert!(matches!(
            storage.complete_multipart(key, &upload_id, &wrong_tag).await,
            Err(PostError::Validation(_))
        ));

        let missing = [
            CompletedPart {
                part_number: 1,
                e_tag: md5_hex(b"1234"),
            },
            CompletedPart {
                part_number: 2,
                e_tag: md5_hex(b"5678"),
            },
        ];
        assert!(matches!(
            storage.complete_multipart(key, &upload_id, &missing).await,
            Err(PostError::Validation(_))
        ));
        assert!(matches!(
            storage.get_object_reader(key).await,
            Err(PostError::ObjectNotFound(_))
        ));

        assert!(matches!(
            storage.complete_multipart(key, "no-such-upload", &missing).await,
            Err(PostError::UploadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_ignores_missing_objects_and_prunes_shards() {
        let (storage, dir) = storage(100, 100).await;
        let key = "alice/image/p1";
        storage.put_object_stream(key, body(b"hello")).await.unwrap();

        storage
            .delete_objects(&[key.to_string(), "alice/image/THUMBNAILS/p1".to_string()])
            .await
            .unwrap();

        assert!(matches!(
            storage.get_object_reader(key).await,
            Err(PostError::ObjectNotFound(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let (storage, _dir) = storage(100, 100).await;
        for key in [
            "",
            "/etc/passwd",
            "a/../b",
            "../b",
            "a/..",
            "a/./b",
            ".multipart/x",
        ] {
            assert!(matches!(
                storage.get_read_authorization(key).await,
                Err(PostError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn dots_inside_a_segment_are_allowed() {
        let (storage, _dir) = storage(100, 100).await;
        for key in [
            "alice/image/alice-Wait...-1723153880",
            "alice/image/v1..2",
            "alice/image/.hidden",
        ] {
            storage.get_read_authorization(key).await.unwrap();
            storage.put_object_stream(key, body(b"x")).await.unwrap();
            let (size, _) = storage.get_object_reader(key).await.unwrap();
            assert_eq!(size, 1);
        }
    }
}
