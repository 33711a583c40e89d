//! Versioned session storage
//!
//! One record per conversation. Every write goes through `apply`, which
//! runs a mutation against the committed record and bumps the version, all
//! under a per-thread lock.

mod database;
mod memory;

pub use database::DatabaseSessionStore;
pub use memory::MemorySessionStore;

use crate::flow::{SessionRecord, TransitionError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Mutation run against the committed record
pub type RecordUpdate<'a> =
    Box<dyn FnOnce(&SessionRecord) -> Result<SessionRecord, TransitionError> + Send + 'a>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Session store unavailable: {0}")]
    Backend(String),
}

impl From<crate::db::DbError> for StoreError {
    fn from(e: crate::db::DbError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Keyed storage of session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the record, creating an empty one on first contact
    async fn get_or_create(&self, thread_id: &str) -> Result<SessionRecord, StoreError>;

    /// Atomically check `expected_version` (None skips the check), run
    /// `update`, and commit with the version incremented by one
    async fn apply(
        &self,
        thread_id: &str,
        expected_version: Option<u64>,
        update: RecordUpdate<'_>,
    ) -> Result<SessionRecord, StoreError>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get_or_create(&self, thread_id: &str) -> Result<SessionRecord, StoreError> {
        (**self).get_or_create(thread_id).await
    }

    async fn apply(
        &self,
        thread_id: &str,
        expected_version: Option<u64>,
        update: RecordUpdate<'_>,
    ) -> Result<SessionRecord, StoreError> {
        (**self).apply(thread_id, expected_version, update).await
    }
}

/// Shared commit rule for every backend
fn next_revision(
    current: &SessionRecord,
    expected_version: Option<u64>,
    update: RecordUpdate<'_>,
) -> Result<SessionRecord, StoreError> {
    if let Some(expected) = expected_version {
        if expected != current.version {
            return Err(StoreError::VersionConflict {
                expected,
                actual: current.version,
            });
        }
    }
    let mut next = update(current)?;
    next.thread_id.clone_from(&current.thread_id);
    next.version = current.version + 1;
    Ok(next)
}
