//! SQLite-backed session store

use super::{next_revision, RecordUpdate, SessionStore, StoreError};
use crate::db::Database;
use crate::flow::SessionRecord;
use async_trait::async_trait;

/// Sessions persisted in the `sessions` table. The connection mutex is
/// the per-thread lock; the version column guards every update.
#[derive(Clone)]
pub struct DatabaseSessionStore {
    db: Database,
}

impl DatabaseSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseSessionStore {
    async fn get_or_create(&self, thread_id: &str) -> Result<SessionRecord, StoreError> {
        Ok(self.db.get_or_create_session(thread_id)?)
    }

    async fn apply(
        &self,
        thread_id: &str,
        expected_version: Option<u64>,
        update: RecordUpdate<'_>,
    ) -> Result<SessionRecord, StoreError> {
        self.db.update_session(thread_id, |current| {
            next_revision(current, expected_version, update)
        })
    }
}
