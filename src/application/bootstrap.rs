//! Bounded wait for the first media segments of a fresh session.

use crate::domain::hls;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct BootstrapPolicy {
    pub timeout: Duration,
    pub min_segments: usize,
    pub interval: Duration,
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            min_segments: 1,
            interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Enough segments are on disk
    Ready { segments: usize },
    /// The pipeline ended first; no more segments will appear
    Finished { segments: usize },
    TimedOut,
}

impl BootstrapOutcome {
    pub fn has_audio(self) -> bool {
        match self {
            BootstrapOutcome::Ready { .. } => true,
            BootstrapOutcome::Finished { segments } => segments > 0,
            BootstrapOutcome::TimedOut => false,
        }
    }
}

/// Poll `dir` until `min_segments` segments exist, `finished` turns true, or
/// the timeout runs out.
pub async fn wait_for_segments(
    dir: &Path,
    policy: BootstrapPolicy,
    finished: &mut watch::Receiver<bool>,
) -> BootstrapOutcome {
    let wanted = policy.min_segments.max(1);
    let deadline = Instant::now() + policy.timeout;

    loop {
        let segments = count_segments(dir, wanted).await;
        if segments >= wanted {
            tracing::info!(dir = %dir.display(), segments, "First segments available");
            return BootstrapOutcome::Ready { segments };
        }
        if *finished.borrow() {
            return BootstrapOutcome::Finished { segments };
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                dir = %dir.display(),
                timeout = ?policy.timeout,
                "No segment appeared before the bootstrap timeout, returning anyway"
            );
            return BootstrapOutcome::TimedOut;
        }

        let nap = policy.interval.min(deadline - now);
        tokio::select! {
            _ = tokio::time::sleep(nap) => {}
            changed = finished.changed() => {
                if changed.is_err() {
                    tokio::time::sleep(nap).await;
                }
            }
        }
    }
}

/// Segment files in `dir`, counting no further than `cap`.
async fn count_segments(dir: &Path, cap: usize) -> usize {
    match scan(dir, cap).await {
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), "Segment scan failed: {}", e);
            0
        }
    }
}

async fn scan(dir: &Path, cap: usize) -> io::Result<usize> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| hls::segment_index(name).is_some())
        {
            found += 1;
            if found >= cap {
                break;
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn policy(timeout_ms: u64, min_segments: usize) -> BootstrapPolicy {
        BootstrapPolicy {
            timeout: Duration::from_millis(timeout_ms),
            min_segments,
            interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_returns_when_segment_appears() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let (_tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tokio::fs::write(path.join("segment_000.m4s"), b"x").await.unwrap();
        });

        let outcome = wait_for_segments(dir.path(), policy(5_000, 1), &mut rx).await;
        assert_eq!(outcome, BootstrapOutcome::Ready { segments: 1 });
    }

    #[tokio::test]
    async fn test_times_out_without_segments() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("init.mp4"), b"x").unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let started = Instant::now();
        let outcome = wait_for_segments(dir.path(), policy(200, 1), &mut rx).await;
        assert_eq!(outcome, BootstrapOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_an_error() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("deleted");
        let (_tx, mut rx) = watch::channel(false);
        let outcome = wait_for_segments(&gone, policy(100, 1), &mut rx).await;
        assert_eq!(outcome, BootstrapOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_pipeline_completion_ends_wait_early() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        let outcome = wait_for_segments(dir.path(), policy(10_000, 1), &mut rx).await;
        assert_eq!(outcome, BootstrapOutcome::Finished { segments: 0 });
        assert!(!outcome.has_audio());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_waits_for_min_segments() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("segment_000.m4s"), b"x").unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let outcome = wait_for_segments(dir.path(), policy(150, 2), &mut rx).await;
        assert_eq!(outcome, BootstrapOutcome::TimedOut);

        std::fs::write(dir.path().join("segment_001.m4s"), b"x").unwrap();
        let outcome = wait_for_segments(dir.path(), policy(150, 2), &mut rx).await;
        assert_eq!(outcome, BootstrapOutcome::Ready { segments: 2 });
    }
}
