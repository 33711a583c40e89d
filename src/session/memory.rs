//! In-process session store

use super::{next_revision, RecordUpdate, SessionStore, StoreError};
use crate::flow::SessionRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Session records held in memory, one lock per thread
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionRecord>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, thread_id: &str) -> Arc<Mutex<SessionRecord>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(slot) = sessions.get(thread_id) {
                return Arc::clone(slot);
            }
        }

        let mut sessions = self.sessions.write().await;
        let slot = sessions.entry(thread_id.to_string()).or_insert_with(|| {
            tracing::debug!(thread_id = %thread_id, "Created session");
            Arc::new(Mutex::new(SessionRecord::new(thread_id)))
        });
        Arc::clone(slot)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, thread_id: &str) -> Result<SessionRecord, StoreError> {
        let slot = self.slot(thread_id).await;
        let record = slot.lock().await;
        Ok(record.clone())
    }

    async fn apply(
        &self,
        thread_id: &str,
        expected_version: Option<u64>,
        update: RecordUpdate<'_>,
    ) -> Result<SessionRecord, StoreError> {
        let slot = self.slot(thread_id).await;
        let mut record = slot.lock().await;
        // No await between here and the write below
        let next = next_revision(&record, expected_version, update)?;
        *record = next.clone();
        Ok(next)
    }
}
