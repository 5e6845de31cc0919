//! Domain event publication.
//!
//! The workflows only see [`EventPublisher`]. The bundled implementation is a
//! transactional outbox: each event becomes a row in `domain_events`, from
//! which a relay can forward it to the message bus. Delivery downstream is
//! at-least-once; no idempotency key is attached here.

use crate::{
    errors::{PostError, PostResult},
    models::event::DomainEvent,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> PostResult<()>;
}

/// Appends events to the SQLite outbox table.
#[derive(Clone)]
pub struct OutboxEventPublisher {
    db: Arc<SqlitePool>,
}

impl OutboxEventPublisher {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventPublisher for OutboxEventPublisher {
    async fn publish(&self, event: &DomainEvent) -> PostResult<()> {
        let publish_error = |reason: String| PostError::Publish {
            event: event.event_type.clone(),
            reason,
        };

        let payload =
            serde_json::to_string(&event.payload).map_err(|err| publish_error(err.to_string()))?;
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO domain_events (id, event_type, payload, published_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&event.event_type)
        .bind(&payload)
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        .map_err(|err| {
            error!(event = %event.event_type, error = %err, "publishing event failed");
            publish_error(err.to_string())
        })?;

        info!(event = %event.event_type, event_id = %id, "event published");
        Ok(())
    }
}
