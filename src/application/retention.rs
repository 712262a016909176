//! Evicts finished sessions once they are older than the retention period.

use crate::ports::repository::SessionRepository;
use crate::ports::storage::StoragePort;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct RetentionSweeper<St, R> {
    store: Arc<St>,
    repo: Arc<R>,
    ttl: Duration,
    interval: Duration,
}

impl<St, R> RetentionSweeper<St, R>
where
    St: StoragePort + 'static,
    R: SessionRepository + 'static,
{
    pub fn new(store: Arc<St>, repo: Arc<R>, ttl: Duration) -> Self {
        let interval = (ttl / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
        Self {
            store,
            repo,
            ttl,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Remove every expired session. Returns how many went.
    pub async fn sweep_once(&self) -> usize {
        let ttl = match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => ttl,
            Err(_) => return 0,
        };
        let expired = match self.repo.finished_before(Utc::now() - ttl).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::warn!("Could not list expired sessions: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for record in expired {
            self.store.cleanup(&record.session_dir).await;
            match self.repo.remove(&record.session_id).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    session_id = %record.session_id,
                    "Could not drop expired session record: {}",
                    e
                ),
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Evicted expired sessions");
        }
        removed
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(ttl = ?self.ttl, "Session retention sweeper started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep_once().await;
                    }
                }
            }
            tracing::info!("Session retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::memory::MemoryRepository;
    use crate::adapters::local::segment_store::SegmentStore;
    use crate::domain::session::{SessionRecord, SessionStatus};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sweep_removes_only_expired_finished_sessions() {
        let root = tempdir().unwrap();
        let store = Arc::new(SegmentStore::at(root.path(), "/media/hls/"));
        let repo = Arc::new(MemoryRepository::new());

        let old = store.create(Some("old")).await;
        let mut done = SessionRecord::new("old", &old.playlist_url, old.path.clone());
        done.transition(SessionStatus::Running);
        done.transition(SessionStatus::Ready);
        done.finished_at = Some(Utc::now() - chrono::Duration::seconds(120));
        repo.save(&done).await.unwrap();

        let live = store.create(Some("live")).await;
        let mut running = SessionRecord::new("live", &live.playlist_url, live.path.clone());
        running.transition(SessionStatus::Running);
        repo.save(&running).await.unwrap();

        let sweeper = RetentionSweeper::new(store, repo.clone(), Duration::from_secs(60));
        assert_eq!(sweeper.sweep_once().await, 1);

        assert!(!old.path.exists());
        assert!(repo.get("old").await.unwrap().is_none());
        assert!(live.path.exists());
        assert!(repo.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_cancel() {
        let root = tempdir().unwrap();
        let sweeper = RetentionSweeper::new(
            Arc::new(SegmentStore::at(root.path(), "/media/hls/")),
            Arc::new(MemoryRepository::new()),
            Duration::from_secs(60),
        )
        .with_interval(Duration::from_millis(10));

        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
