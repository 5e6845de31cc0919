//! Post workflows and the collaborators they are built on.
//!
//! The workflows (`creation_saga`, `pagination`, `deletion`) only see the
//! capability traits `MetadataStore`, `AuthorizationProvider` and
//! `EventPublisher`; the concrete SQLite and disk implementations are wired
//! together once in `AppState`.

pub mod creation_saga;
pub mod deletion;
pub mod event_publisher;
pub mod identifier;
pub mod metadata_store;
pub mod object_storage;
pub mod pagination;
pub mod signing;

#[cfg(test)]
pub mod memory;
