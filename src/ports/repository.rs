use crate::domain::session::SessionRecord;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or replace a record (last writer wins)
    async fn save(&self, record: &SessionRecord) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    async fn remove(&self, session_id: &str) -> Result<()>;

    /// Records in a terminal state that finished before `cutoff`
    async fn finished_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SessionRecord>>;
}
