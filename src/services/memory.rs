//! In-memory collaborator doubles with operation tracing and failure injection.
//!
//! All three doubles can share one [`Journal`] so tests can assert on the
//! order in which the workflows touched them.

use crate::{
    errors::{PostError, PostResult},
    models::{
        event::DomainEvent,
        keys::StoreKey,
        post::Post,
        upload::{CompletedPart, WriteAuthorization},
    },
    services::{
        event_publisher::EventPublisher,
        metadata_store::{IndexPage, MetadataStore},
        object_storage::AuthorizationProvider,
    },
};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};

/// Record of a collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    InsertPost(String),
    GetPost(String),
    DeletePost(String),
    BatchDeletePosts(Vec<String>),
    QueryIndex { owner: String, start: Option<String> },
    BatchGetPosts(Vec<String>),
    WriteAuthorization(String),
    ReadAuthorization(String),
    CompleteMultipart { key: String, upload_id: String },
    DeleteObjects(Vec<String>),
    Publish(String),
}

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Op>>>);

impl Journal {
    fn record(&self, op: Op) {
        self.0.lock().expect("lock").push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.lock().expect("lock").clone()
    }

    pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.ops().iter().filter(|op| pred(op)).count()
    }
}

/// Which metadata operation should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFault {
    Insert,
    Get,
    Delete,
    BatchDelete,
    Query,
    BatchGet,
}

#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    rows: Mutex<BTreeMap<String, Post>>,
    faults: Mutex<HashSet<StoreFault>>,
    /// When set, index scans include the start row itself.
    echo_boundary: bool,
    journal: Journal,
}

impl MemoryMetadataStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// A store whose index scans return the start row again.
    pub fn echoing(journal: Journal) -> Self {
        Self {
            echo_boundary: true,
            journal,
            ..Self::default()
        }
    }

    pub fn seed(&self, post: Post) {
        self.rows
            .lock()
            .expect("lock")
            .insert(post.post_id.clone(), post);
    }

    pub fn row(&self, id: &str) -> Option<Post> {
        self.rows.lock().expect("lock").get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("lock").len()
    }

    pub fn inject_failure(&self, fault: StoreFault) {
        self.faults.lock().expect("lock").insert(fault);
    }

    fn check(&self, fault: StoreFault) -> PostResult<()> {
        if self.faults.lock().expect("lock").contains(&fault) {
            return Err(PostError::store(format!("injected {fault:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_post(&self, post: &Post) -> PostResult<()> {
        self.journal.record(Op::InsertPost(post.post_id.clone()));
        self.check(StoreFault::Insert)?;
        self.seed(post.clone());
        Ok(())
    }

    async fn get_post(&self, key: &StoreKey) -> PostResult<Post> {
        self.journal.record(Op::GetPost(key.post_id().to_string()));
        self.check(StoreFault::Get)?;
        self.row(key.post_id())
            .ok_or_else(|| PostError::PostNotFound(key.post_id().to_string()))
    }

    async fn delete_post(&self, key: &StoreKey) -> PostResult<()> {
        self.journal.record(Op::DeletePost(key.post_id().to_string()));
        self.check(StoreFault::Delete)?;
        self.rows
            .lock()
            .expect("lock")
            .remove(key.post_id())
            .map(|_| ())
            .ok_or_else(|| PostError::PostNotFound(key.post_id().to_string()))
    }

    async fn batch_delete_posts(&self, keys: &[StoreKey]) -> PostResult<()> {
        let ids = keys.iter().map(|k| k.post_id().to_string()).collect();
        self.journal.record(Op::BatchDeletePosts(ids));
        self.check(StoreFault::BatchDelete)?;
        let mut rows = self.rows.lock().expect("lock");
        for key in keys {
            rows.remove(key.post_id());
        }
        Ok(())
    }

    async fn query_by_index(
        &self,
        owner: &str,
        start: Option<&StoreKey>,
        limit: usize,
    ) -> PostResult<IndexPage> {
        self.journal.record(Op::QueryIndex {
            owner: owner.to_string(),
            start: start.map(|k| k.post_id().to_string()),
        });
        self.check(StoreFault::Query)?;

        let mut rows: Vec<Post> = self
            .rows
            .lock()
            .expect("lock")
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&b.created_at, &b.post_id).cmp(&(&a.created_at, &a.post_id))
        });

        if let Some(StoreKey::UserIndex {
            created_at,
            post_id,
            ..
        }) = start
        {
            let boundary = (created_at, post_id);
            rows.retain(|p| {
                let pos = (&p.created_at, &p.post_id);
                pos < boundary || (self.echo_boundary && pos == boundary)
            });
        }

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        Ok(IndexPage { rows, has_more })
    }

    async fn batch_get_posts(&self, keys: &[StoreKey]) -> PostResult<Vec<Post>> {
        let ids = keys.iter().map(|k| k.post_id().to_string()).collect();
        self.journal.record(Op::BatchGetPosts(ids));
        self.check(StoreFault::BatchGet)?;
        Ok(keys.iter().filter_map(|k| self.row(k.post_id())).collect())
    }
}

/// Authorization provider that mints fake URLs and can fail per key.
#[derive(Debug)]
pub struct FakeAuthorizer {
    multipart_threshold: u64,
    part_size: u64,
    fail_writes: Mutex<bool>,
    fail_complete: Mutex<bool>,
    fail_delete: Mutex<bool>,
    /// Keys whose read authorization fails; `"*"` fails all of them.
    fail_reads: Mutex<HashSet<String>>,
    journal: Journal,
}

impl FakeAuthorizer {
    pub fn new(journal: Journal) -> Self {
        Self {
            multipart_threshold: 100,
            part_size: 40,
            fail_writes: Mutex::new(false),
            fail_complete: Mutex::new(false),
            fail_delete: Mutex::new(false),
            fail_reads: Mutex::new(HashSet::new()),
            journal,
        }
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().expect("lock") = true;
    }

    pub fn fail_complete(&self) {
        *self.fail_complete.lock().expect("lock") = true;
    }

    pub fn fail_delete(&self) {
        *self.fail_delete.lock().expect("lock") = true;
    }

    pub fn fail_read(&self, key: impl Into<String>) {
        self.fail_reads.lock().expect("lock").insert(key.into());
    }

    pub fn fail_all_reads(&self) {
        self.fail_read("*");
    }
}

#[async_trait]
impl AuthorizationProvider for FakeAuthorizer {
    async fn get_write_authorizations(
        &self,
        key: &str,
        size_hint: u64,
    ) -> PostResult<WriteAuthorization> {
        self.journal.record(Op::WriteAuthorization(key.to_string()));
        if *self.fail_writes.lock().expect("lock") {
            return Err(PostError::store("injected write authorization failure"));
        }
        if size_hint <= self.multipart_threshold {
            return Ok(WriteAuthorization {
                upload_id: None,
                urls: vec![format!("https://fake/{key}?put")],
            });
        }
        let parts = size_hint.div_ceil(self.part_size);
        Ok(WriteAuthorization {
            upload_id: Some(format!("upload-{key}")),
            urls: (1..=parts)
                .map(|n| format!("https://fake/{key}?part={n}"))
                .collect(),
        })
    }

    async fn get_read_authorization(&self, key: &str) -> PostResult<String> {
        self.journal.record(Op::ReadAuthorization(key.to_string()));
        let failing = self.fail_reads.lock().expect("lock");
        if failing.contains("*") || failing.contains(key) {
            return Err(PostError::store(format!("injected read failure for {key}")));
        }
        Ok(format!("https://fake/{key}?get"))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        _parts: &[CompletedPart],
    ) -> PostResult<()> {
        self.journal.record(Op::CompleteMultipart {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        });
        if *self.fail_complete.lock().expect("lock") {
            return Err(PostError::store("injected completion failure"));
        }
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> PostResult<()> {
        self.journal.record(Op::DeleteObjects(keys.to_vec()));
        if *self.fail_delete.lock().expect("lock") {
            return Err(PostError::store("injected delete failure"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
    fail: Mutex<bool>,
    journal: Journal,
}

impl RecordingPublisher {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    pub fn fail(&self) {
        *self.fail.lock().expect("lock") = true;
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("lock").clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> PostResult<()> {
        self.journal.record(Op::Publish(event.event_type.clone()));
        if *self.fail.lock().expect("lock") {
            return Err(PostError::Publish {
                event: event.event_type.clone(),
                reason: "injected".into(),
            });
        }
        self.events.lock().expect("lock").push(event.clone());
        Ok(())
    }
}

/// A post row for `owner` created `seconds` into 2024-01-01.
pub fn post_at(id: &str, owner: &str, seconds: u32, has_thumbnail: bool) -> Post {
    let created_at = format!("2024-01-01T00:{:02}:{:02}.000000Z", seconds / 60, seconds % 60);
    Post {
        post_id: id.to_string(),
        owner: owner.to_string(),
        content_type: "image".into(),
        title: id.to_string(),
        description: String::new(),
        size_bytes: 10,
        has_thumbnail,
        last_updated: created_at.clone(),
        created_at,
    }
}

/// One journal shared by a fresh set of doubles.
pub struct Doubles {
    pub journal: Journal,
    pub store: Arc<MemoryMetadataStore>,
    pub auth: Arc<FakeAuthorizer>,
    pub events: Arc<RecordingPublisher>,
}

impl Doubles {
    pub fn new() -> Self {
        Self::with_store(MemoryMetadataStore::new)
    }

    pub fn echoing() -> Self {
        Self::with_store(MemoryMetadataStore::echoing)
    }

    fn with_store(make: fn(Journal) -> MemoryMetadataStore) -> Self {
        let journal = Journal::default();
        Self {
            store: Arc::new(make(journal.clone())),
            auth: Arc::new(FakeAuthorizer::new(journal.clone())),
            events: Arc::new(RecordingPublisher::new(journal.clone())),
            journal,
        }
    }
}
