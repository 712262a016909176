//! Local-filesystem session directories.
//!
//! The root is resolved once, at construction, by walking a fallback chain:
//! the configured `HLS_ROOT`, `<media_root>/hls`, the deployment path, a
//! fresh temp directory and finally the working directory. Whenever the
//! chosen root is not the one the static file server expects, each session
//! is exposed there through a symlink or, failing that, a copy thread.

use super::forwarder::{self, ForwarderHandle, ForwarderTiming};
use crate::config::StorageConfig;
use crate::domain::hls::PLAYLIST_NAME;
use crate::ports::storage::{SessionLocation, StoragePort};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

/// Which link of the fallback chain the root came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    Configured,
    MediaRoot,
    Deploy,
    Temp,
    WorkingDir,
}

pub struct SegmentStore {
    root: PathBuf,
    source: RootSource,
    /// Set when sessions must be mirrored into another directory
    expected: Option<PathBuf>,
    base_url: String,
    link_mirrors: bool,
    forwarders: Mutex<HashMap<PathBuf, ForwarderHandle>>,
    timing: ForwarderTiming,
}

impl SegmentStore {
    pub fn new(config: &StorageConfig) -> Self {
        let expected = config.expected_dir();
        let (root, source) = resolve_root(config);

        tracing::info!(
            root = %root.display(),
            source = ?source,
            "HLS session root resolved"
        );

        let mirror = if same_dir(&root, &expected) {
            None
        } else {
            tracing::warn!(
                root = %root.display(),
                expected = %expected.display(),
                "Sessions are not written where the static server expects them; mirroring"
            );
            Some(expected)
        };

        Self {
            root,
            source,
            expected: mirror,
            base_url: config.base_url.clone(),
            link_mirrors: config.link_mirrors,
            forwarders: Mutex::new(HashMap::new()),
            timing: ForwarderTiming::default(),
        }
    }

    /// Use `root` as-is, without fallbacks or mirroring.
    pub fn at(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            source: RootSource::Configured,
            expected: None,
            base_url: base_url.to_string(),
            link_mirrors: true,
            forwarders: Mutex::new(HashMap::new()),
            timing: ForwarderTiming::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> RootSource {
        self.source
    }

    /// Directory a static file server should serve sessions from.
    pub fn public_dir(&self) -> &Path {
        self.expected.as_deref().unwrap_or(&self.root)
    }

    fn expose(&self, session_id: &str, path: &Path) {
        let Some(expected) = &self.expected else {
            return;
        };
        let target = expected.join(session_id);
        if fs::symlink_metadata(&target).is_ok() {
            return;
        }

        if self.link_mirrors {
            match link_dir(path, &target) {
                Ok(()) => {
                    tracing::info!(
                        link = %target.display(),
                        "Linked session into expected directory"
                    );
                    return;
                }
                Err(e) => tracing::warn!(
                    link = %target.display(),
                    "Could not link session directory, falling back to copying: {}",
                    e
                ),
            }
        }

        match forwarder::spawn(path.to_path_buf(), target.clone(), self.timing.clone()) {
            Ok(handle) => {
                if let Ok(mut forwarders) = self.forwarders.lock() {
                    forwarders.retain(|_, h| !h.is_finished());
                    forwarders.insert(path.to_path_buf(), handle);
                }
            }
            Err(e) => tracing::error!(
                dst = %target.display(),
                "Could not start file forwarder, session will not be reachable: {}",
                e
            ),
        }
    }
}

#[async_trait]
impl StoragePort for SegmentStore {
    async fn create(&self, session_id: Option<&str>) -> SessionLocation {
        let session_id = match session_id {
            Some(id) if is_valid_session_id(id) => id.to_string(),
            Some(id) => {
                tracing::warn!(requested = id, "Unusable session id, generating a new one");
                new_session_id()
            }
            None => new_session_id(),
        };

        let path = self.root.join(&session_id);
        if let Err(e) = tokio::fs::create_dir_all(&path).await {
            tracing::error!(
                path = %path.display(),
                "Could not create session directory: {}",
                e
            );
        }
        self.expose(&session_id, &path);

        tracing::info!(session_id = %session_id, path = %path.display(), "Session directory ready");
        SessionLocation {
            playlist_url: self.playlist_url(&session_id),
            session_id,
            path,
        }
    }

    fn playlist_url(&self, session_id: &str) -> String {
        format!("{}{}/{}", self.base_url, session_id, PLAYLIST_NAME)
    }

    async fn cleanup(&self, path: &Path) {
        let handle = self
            .forwarders
            .lock()
            .ok()
            .and_then(|mut forwarders| forwarders.remove(path));
        if let Some(handle) = handle {
            // Joined so it cannot recreate the mirror after removal
            if let Err(e) = tokio::task::spawn_blocking(move || handle.join()).await {
                tracing::warn!(path = %path.display(), "File forwarder did not shut down: {}", e);
            }
        }

        if let (Some(expected), Some(name)) = (&self.expected, path.file_name()) {
            let mirror = expected.join(name);
            let removed = match fs::symlink_metadata(&mirror) {
                Ok(meta) if meta.file_type().is_symlink() => tokio::fs::remove_file(&mirror).await,
                Ok(_) => tokio::fs::remove_dir_all(&mirror).await,
                Err(_) => Ok(()),
            };
            if let Err(e) = removed {
                tracing::warn!(
                    path = %mirror.display(),
                    "Could not remove mirrored session: {}",
                    e
                );
            }
        }

        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => tracing::info!(path = %path.display(), "Removed session directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %path.display(),
                "Could not remove session directory: {}",
                e
            ),
        }
    }
}

fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Ids become directory names and URL segments.
fn is_valid_session_id(id: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("static regex"))
        .is_match(id)
}

fn resolve_root(config: &StorageConfig) -> (PathBuf, RootSource) {
    let mut candidates = Vec::new();
    if let Some(root) = &config.hls_root {
        candidates.push((root.clone(), RootSource::Configured));
    }
    candidates.push((config.media_root.join("hls"), RootSource::MediaRoot));
    candidates.push((config.deploy_root.clone(), RootSource::Deploy));

    for (dir, source) in candidates {
        match prepare_dir(&dir) {
            Ok(dir) => return (dir, source),
            Err(e) => tracing::warn!(dir = %dir.display(), "HLS root not usable: {}", e),
        }
    }

    let temp = std::env::temp_dir().join(format!("hls_{}", Uuid::new_v4().simple()));
    match prepare_dir(&temp) {
        Ok(dir) => {
            tracing::error!(
                dir = %dir.display(),
                "No configured HLS root is writable, using a temporary directory"
            );
            return (dir, RootSource::Temp);
        }
        Err(e) => tracing::error!(dir = %temp.display(), "Temporary HLS root not usable: {}", e),
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    tracing::error!(
        dir = %cwd.display(),
        "Falling back to the working directory for HLS output"
    );
    (cwd, RootSource::WorkingDir)
}

/// Create `dir`, prove it writable, and return its absolute form.
fn prepare_dir(dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(format!(".probe_{}", Uuid::new_v4().simple()));
    fs::write(&probe, b"")?;
    let _ = fs::remove_file(&probe);
    dir.canonicalize()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(unix)]
fn link_dir(src: &Path, link: &Path) -> io::Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(src, link)
}

#[cfg(not(unix))]
fn link_dir(_src: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "directory links not supported on this platform",
    ))
}
