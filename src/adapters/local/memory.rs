//! In-process SessionRepository.
//!
//! Records are stored serialized, so callers always get a snapshot and never
//! share state with the writer.

use crate::domain::session::SessionRecord;
use crate::error::Result;
use crate::ports::repository::SessionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn save(&self, record: &SessionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.records
            .write()
            .await
            .insert(record.session_id.clone(), json);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let records = self.records.read().await;
        match records.get(session_id) {
            Some(data) => Ok(Some(serde_json::from_str(data)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.records.write().await.remove(session_id);
        Ok(())
    }

    async fn finished_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let records = self.records.read().await;
        let mut expired = Vec::new();
        for data in records.values() {
            let record: SessionRecord = serde_json::from_str(data)?;
            if record.status.is_terminal()
                && record.finished_at.is_some_and(|finished| finished < cutoff)
            {
                expired.push(record);
            }
        }
        Ok(expired)
    }
}
