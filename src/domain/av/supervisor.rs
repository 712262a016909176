//! Keeps one transcoder alive per session and turns audio writes into segments.
//!
//! Every write goes through [`TranscoderSupervisor::ensure_alive`], which
//! replaces a dead process before any I/O. A write that hits a broken pipe is
//! retried exactly once on a fresh process; if that fails too, the audio is
//! dropped and counted. Write failures are never returned to the caller.
//!
//! The manifest is seeded before the first process starts and re-checked
//! before every restart and after the final exit, so a polling client always
//! finds a parseable playlist.

use super::cmd::{TranscodeCommand, TranscoderSettings};
use super::process::TranscoderProcess;
use crate::domain::hls::{self, MediaPlaylist, MASTER_PLAYLIST_NAME, PLAYLIST_NAME};
use crate::domain::session::FinalizeStats;
use crate::error::{Result, StreamError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

const MASTER_BANDWIDTH: u32 = 128_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// First attempt failed; succeeded on a restarted process
    Retried,
    Dropped,
}

impl WriteOutcome {
    pub fn delivered(self) -> bool {
        !matches!(self, WriteOutcome::Dropped)
    }
}

pub struct TranscoderSupervisor {
    dir: PathBuf,
    settings: TranscoderSettings,
    command: Arc<dyn TranscodeCommand>,
    process: Option<TranscoderProcess>,
    chunk_count: usize,
    restarts: usize,
    dropped: usize,
}

impl TranscoderSupervisor {
    /// Seed the manifest and launch the first process.
    ///
    /// Fails if `dir` is not writable or the process dies straight away.
    pub async fn start(
        dir: &Path,
        settings: TranscoderSettings,
        command: Arc<dyn TranscodeCommand>,
    ) -> Result<Self> {
        ensure_writable(dir).await?;

        let mut supervisor = Self {
            dir: dir.to_path_buf(),
            settings,
            command,
            process: None,
            chunk_count: 0,
            restarts: 0,
            dropped: 0,
        };
        supervisor.ensure_manifest().await;
        supervisor.launch().await?;
        Ok(supervisor)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.dir.join(PLAYLIST_NAME)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    pub fn segment_count(&self) -> usize {
        hls::list_segments(&self.dir).map(|s| s.len()).unwrap_or(0)
    }

    async fn launch(&mut self) -> Result<()> {
        ensure_writable(&self.dir).await?;

        let mut process =
            TranscoderProcess::spawn(self.command.as_ref(), &self.dir, &self.settings)?;
        tokio::time::sleep(self.settings.startup_grace).await;

        if !process.is_alive() {
            let stderr = process.stderr_tail().await;
            tracing::error!(dir = %self.dir.display(), "Transcoder failed to start: {}", stderr);
            return Err(StreamError::TranscoderExited { stderr });
        }

        self.process = Some(process);
        Ok(())
    }

    /// Make sure a live process is attached, replacing a dead one.
    pub async fn ensure_alive(&mut self) -> Result<()> {
        self.revive().await.map(|_| ())
    }

    /// Like [`Self::ensure_alive`], reporting whether a new process was launched.
    async fn revive(&mut self) -> Result<bool> {
        if let Some(process) = self.process.as_mut() {
            if process.is_alive() {
                return Ok(false);
            }
        }

        if let Some(dead) = self.process.take() {
            tracing::warn!(pid = ?dead.id(), "Transcoder is not running, restarting it");
            dead.shutdown().await;
        }

        self.ensure_manifest().await;
        self.restarts += 1;
        self.launch().await?;
        Ok(true)
    }

    /// Feed encoded audio to the transcoder. Never fails; see [`WriteOutcome`].
    pub async fn write(&mut self, bytes: &[u8]) -> WriteOutcome {
        if bytes.is_empty() {
            tracing::warn!("Empty audio data received, skipping");
            return WriteOutcome::Dropped;
        }

        let restarted = match self.revive().await {
            Ok(restarted) => restarted,
            Err(e) => {
                tracing::error!("No transcoder available, dropping {} bytes: {}", bytes.len(), e);
                self.dropped += 1;
                return WriteOutcome::Dropped;
            }
        };

        let first = match self.attempt(bytes).await {
            Ok(()) => {
                self.chunk_count += 1;
                return WriteOutcome::Written;
            }
            Err(e) => e,
        };

        if let Some(broken) = self.process.take() {
            broken.shutdown().await;
        }
        // One restart per write
        if restarted {
            tracing::error!(
                "Write to freshly restarted transcoder failed, dropping {} bytes of audio: {}",
                bytes.len(),
                first
            );
            self.dropped += 1;
            return WriteOutcome::Dropped;
        }
        tracing::warn!("Write to transcoder failed, restarting: {}", first);

        let retry = match self.ensure_alive().await {
            Ok(()) => self.attempt(bytes).await,
            Err(e) => Err(std::io::Error::other(e.to_string())),
        };
        match retry {
            Ok(()) => {
                self.chunk_count += 1;
                WriteOutcome::Retried
            }
            Err(e) => {
                tracing::error!("Retry failed, dropping {} bytes of audio: {}", bytes.len(), e);
                self.dropped += 1;
                WriteOutcome::Dropped
            }
        }
    }

    async fn attempt(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self.process.as_mut() {
            Some(process) => process.write(bytes).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "no transcoder process",
            )),
        }
    }

    /// Close input, wait for the process to flush, and report what was produced.
    pub async fn finalize(mut self) -> FinalizeStats {
        tracing::info!(dir = %self.dir.display(), "Finalizing HLS playlist");

        if let Some(process) = self.process.take() {
            match process.close_and_wait(self.settings.finalize_timeout).await {
                Ok(Some(status)) if status.success() => {
                    tracing::info!("Transcoder finished cleanly")
                }
                Ok(Some(status)) => tracing::warn!("Transcoder exited with {}", status),
                Ok(None) => tracing::warn!("Transcoder had to be stopped during finalize"),
                Err(e) => tracing::warn!("Could not wait for transcoder: {}", e),
            }
        }

        if !self.playlist_path().exists() {
            tracing::warn!(
                path = %self.playlist_path().display(),
                "Playlist missing after transcoder exit, writing a minimal one"
            );
            self.ensure_manifest().await;
        }

        let segment_count = self.segment_count();
        if segment_count == 0 {
            tracing::warn!(dir = %self.dir.display(), "No segment files produced");
        } else {
            tracing::info!(segment_count, "Segments available");
        }

        FinalizeStats {
            segment_count,
            chunk_count: self.chunk_count,
            restarts: self.restarts,
            dropped_writes: self.dropped,
            playlist_path: self.playlist_path(),
        }
    }

    /// Write a minimal manifest if none exists. Never fails.
    async fn ensure_manifest(&self) {
        let path = self.playlist_path();
        if !path.exists() {
            let playlist = MediaPlaylist::minimal(
                &self.dir,
                self.settings.segment_seconds,
                self.settings.playlist_type.as_deref(),
            );
            if let Err(e) = playlist.write_to(&path).await {
                tracing::error!(path = %path.display(), "Could not write minimal playlist: {}", e);
                write_via_temp(&path, &playlist.render()).await;
            }
        }

        let master = self.dir.join(MASTER_PLAYLIST_NAME);
        if !master.exists() {
            let content = hls::master_playlist(MASTER_BANDWIDTH);
            if let Err(e) = hls::write_atomic(&master, content.as_bytes()).await {
                tracing::warn!(path = %master.display(), "Could not write master playlist: {}", e);
            }
        }
    }
}

/// Last resort: write elsewhere, then try to copy into place.
async fn write_via_temp(path: &Path, content: &str) {
    let alt = std::env::temp_dir().join(format!("{}-{}", Uuid::new_v4().simple(), PLAYLIST_NAME));
    if let Err(e) = tokio::fs::write(&alt, content).await {
        tracing::error!(path = %alt.display(), "Could not write fallback playlist: {}", e);
        return;
    }
    tracing::warn!(path = %alt.display(), "Wrote playlist to alternative location");
    match tokio::fs::copy(&alt, path).await {
        Ok(_) => tracing::info!(path = %path.display(), "Copied fallback playlist into place"),
        Err(e) => tracing::error!(
            path = %path.display(),
            "Could not copy fallback playlist: {}",
            e
        ),
    }
    let _ = tokio::fs::remove_file(&alt).await;
}

async fn ensure_writable(dir: &Path) -> Result<()> {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::error!(dir = %dir.display(), "Cannot create output directory: {}", e);
        return Err(StreamError::NotWritable(dir.to_path_buf()));
    }
    let probe = dir.join(format!(".write-probe-{}", Uuid::new_v4().simple()));
    match tokio::fs::write(&probe, b"").await {
        Ok(()) => {
            let _ = tokio::fs::remove_file(&probe).await;
            Ok(())
        }
        Err(e) => {
            tracing::error!(dir = %dir.display(), "Output directory is not writable: {}", e);
            Err(StreamError::NotWritable(dir.to_path_buf()))
        }
    }
}
