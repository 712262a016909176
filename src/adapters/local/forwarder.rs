//! Mirrors a session directory into the location a static server expects,
//! for hosts where a symlink cannot be created.

use crate::domain::hls::{self, PLAYLIST_NAME};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

const MAX_CONSECUTIVE_ERRORS: u32 = 10;

#[derive(Clone, Debug)]
pub struct ForwarderTiming {
    /// Poll interval while the playlist is still appearing or changing
    pub active: Duration,
    /// Poll interval once the playlist has stopped changing
    pub settled: Duration,
    pub after_error: Duration,
    /// Stop after this many quiet passes in a row
    pub idle_passes: u32,
}

impl Default for ForwarderTiming {
    fn default() -> Self {
        Self {
            active: Duration::from_millis(500),
            settled: Duration::from_secs(2),
            after_error: Duration::from_secs(1),
            idle_passes: 300,
        }
    }
}

/// Handle to a running copy thread. Dropping it does not stop the thread.
pub struct ForwarderHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ForwarderHandle {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop and wait for the thread to exit.
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub fn spawn(src: PathBuf, dst: PathBuf, timing: ForwarderTiming) -> io::Result<ForwarderHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let name = format!(
        "hls-forward-{}",
        src.file_name().and_then(|n| n.to_str()).unwrap_or("session")
    );
    let thread = thread::Builder::new()
        .name(name)
        .spawn(move || run(&src, &dst, &timing, &flag))?;
    Ok(ForwarderHandle {
        stop,
        thread: Some(thread),
    })
}

fn run(src: &Path, dst: &Path, timing: &ForwarderTiming, stop: &AtomicBool) {
    tracing::info!(src = %src.display(), dst = %dst.display(), "Starting file forwarder");
    let mut errors = 0;
    let mut quiet = 0;

    while !stop.load(Ordering::Relaxed) {
        match sync_once(src, dst) {
            Ok(report) => {
                errors = 0;
                if report.ended && report.copied == 0 {
                    tracing::info!(dst = %dst.display(), "Playlist closed, forwarder done");
                    return;
                }
                quiet = if report.copied == 0 { quiet + 1 } else { 0 };
                if quiet >= timing.idle_passes {
                    tracing::info!(dst = %dst.display(), "No changes for a while, forwarder done");
                    return;
                }
                let pause = if report.playlist_forwarded && report.copied == 0 {
                    timing.settled
                } else {
                    timing.active
                };
                thread::sleep(pause);
            }
            Err(e) => {
                errors += 1;
                tracing::error!(
                    "Error in file forwarder ({}/{}): {}",
                    errors,
                    MAX_CONSECUTIVE_ERRORS,
                    e
                );
                if errors >= MAX_CONSECUTIVE_ERRORS {
                    tracing::warn!(
                        src = %src.display(),
                        "File forwarder stopped after {} errors",
                        errors
                    );
                    return;
                }
                thread::sleep(timing.after_error);
            }
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct SyncReport {
    pub copied: usize,
    pub removed: usize,
    pub playlist_forwarded: bool,
    /// The forwarded playlist carries the terminal marker
    pub ended: bool,
}

/// One pass: copy new or changed files, drop segments the source deleted.
pub fn sync_once(src: &Path, dst: &Path) -> io::Result<SyncReport> {
    fs::create_dir_all(dst)?;
    let mut report = SyncReport::default();
    let mut present = Vec::new();

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name_str) = name.to_str() else {
            continue;
        };
        // ffmpeg renames *.tmp into place once complete
        if name_str.ends_with(".tmp") || name_str.starts_with('.') {
            continue;
        }
        let src_file = entry.path();
        if !src_file.is_file() {
            continue;
        }
        present.push(name_str.to_string());

        let dst_file = dst.join(&name);
        if is_newer(&src_file, &dst_file)? {
            copy_atomic(&src_file, &dst_file)?;
            tracing::debug!(file = name_str, "Forwarded file");
            report.copied += 1;
        }
    }

    for entry in fs::read_dir(dst)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if hls::segment_index(name).is_some() && !present.iter().any(|p| p == name) {
                fs::remove_file(entry.path())?;
                report.removed += 1;
            }
        }
    }

    let playlist = dst.join(PLAYLIST_NAME);
    if playlist.exists() {
        report.playlist_forwarded = true;
        let content = fs::read_to_string(&playlist)?;
        report.ended = hls::parse(&content).map(|info| info.ended).unwrap_or(false);
    }
    Ok(report)
}

fn is_newer(src: &Path, dst: &Path) -> io::Result<bool> {
    let dst_modified = match fs::metadata(dst) {
        Ok(meta) => meta.modified()?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    let src_modified = fs::metadata(src)?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    Ok(src_modified > dst_modified)
}

fn copy_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    let mut part = dst.as_os_str().to_os_string();
    part.push(".part");
    let part = PathBuf::from(part);
    fs::copy(src, &part)?;
    fs::rename(&part, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sync_copies_new_files_and_skips_temp() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(src.path().join("segment_000.m4s"), b"seg").unwrap();
        fs::write(src.path().join("audio.m3u8.tmp"), b"partial").unwrap();
        fs::write(
            src.path().join(PLAYLIST_NAME),
            "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXTINF:2.0,\nsegment_000.m4s\n",
        )
        .unwrap();

        let report = sync_once(src.path(), dst.path()).unwrap();
        assert_eq!(report.copied, 2);
        assert!(report.playlist_forwarded);
        assert!(!report.ended);
        assert!(dst.path().join("segment_000.m4s").exists());
        assert!(!dst.path().join("audio.m3u8.tmp").exists());

        let again = sync_once(src.path(), dst.path()).unwrap();
        assert_eq!(again.copied, 0);
    }

    #[test]
    fn test_sync_mirrors_deleted_segments() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(dst.path().join("segment_000.m4s"), b"old").unwrap();
        fs::write(src.path().join("segment_001.m4s"), b"new").unwrap();

        let report = sync_once(src.path(), dst.path()).unwrap();
        assert_eq!(report.removed, 1);
        assert!(!dst.path().join("segment_000.m4s").exists());
        assert!(dst.path().join("segment_001.m4s").exists());
    }

    #[test]
    fn test_forwarder_stops_when_playlist_closed() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::write(
            src.path().join(PLAYLIST_NAME),
            "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-ENDLIST\n",
        )
        .unwrap();

        let timing = ForwarderTiming {
            active: Duration::from_millis(10),
            settled: Duration::from_millis(10),
            after_error: Duration::from_millis(10),
            idle_passes: 1000,
        };
        let handle = spawn(src.path().to_path_buf(), dst.path().to_path_buf(), timing).unwrap();
        for _ in 0..200 {
            if handle.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
        assert!(dst.path().join(PLAYLIST_NAME).exists());
    }

    #[test]
    fn test_forwarder_gives_up_when_source_disappears() {
        let root = tempdir().unwrap();
        let src = root.path().join("gone");
        let dst = root.path().join("mirror");
        let timing = ForwarderTiming {
            active: Duration::from_millis(1),
            settled: Duration::from_millis(1),
            after_error: Duration::from_millis(1),
            idle_passes: 1000,
        };
        let handle = spawn(src, dst, timing).unwrap();
        for _ in 0..200 {
            if handle.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(handle.is_finished());
    }
}
