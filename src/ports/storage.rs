use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A freshly allocated session directory and where clients will find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLocation {
    pub session_id: String,
    /// Absolute directory the transcoder writes into
    pub path: PathBuf,
    /// Public URL of the media playlist
    pub playlist_url: String,
}

#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Allocate an isolated directory for a session. Never fails: the
    /// implementation falls back through weaker locations instead.
    async fn create(&self, session_id: Option<&str>) -> SessionLocation;

    /// Public playlist URL for a session id, without touching the disk.
    fn playlist_url(&self, session_id: &str) -> String;

    /// Remove a session directory tree (best-effort).
    async fn cleanup(&self, path: &Path);
}
