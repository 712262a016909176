//! One running transcoder subprocess and its input pipe.

use super::cmd::{TranscodeCommand, TranscoderSettings};
use crate::error::{Result, StreamError};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin};
use tokio::task::JoinHandle;

const STDERR_TAIL_LINES: usize = 20;

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// Owns a live subprocess. Never reused once dead: drop it and spawn anew.
pub struct TranscoderProcess {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_tail: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl TranscoderProcess {
    pub fn spawn(
        command: &dyn TranscodeCommand,
        output_dir: &Path,
        settings: &TranscoderSettings,
    ) -> Result<Self> {
        let mut child = command
            .build(output_dir, settings)
            .spawn()
            .map_err(StreamError::TranscoderSpawn)?;

        tracing::info!(pid = ?child.id(), dir = %output_dir.display(), "Transcoder started");

        let stdin = child.stdin.take();
        let stderr_tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(stderr, stderr_tail.clone())));

        Ok(Self {
            child: Some(child),
            stdin,
            stderr_tail,
            stderr_task,
            shutdown_timeout: settings.shutdown_timeout,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Process running and its input still open.
    pub fn is_alive(&mut self) -> bool {
        let running = match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        running && self.stdin.is_some()
    }

    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "transcoder input closed"))?;
        stdin.write_all(bytes).await?;
        stdin.flush().await
    }

    /// Last lines the process wrote to stderr, waiting briefly for the pipe to drain.
    pub async fn stderr_tail(&mut self) -> String {
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
        let tail = self.stderr_tail.lock().map(|t| t.clone()).unwrap_or_default();
        Vec::from(tail).join("\n")
    }

    /// Signal end of input and wait for the process to exit on its own.
    ///
    /// Returns `Ok(None)` when it had to be stopped after `limit` elapsed.
    pub async fn close_and_wait(mut self, limit: Duration) -> io::Result<Option<ExitStatus>> {
        self.stdin.take();
        let Some(mut child) = self.child.take() else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no child process"));
        };
        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Some(status?),
            Err(_) => {
                tracing::warn!(pid = ?child.id(), "Transcoder did not exit after end of input");
                terminate(&child);
                stop_within(&mut child, self.shutdown_timeout).await;
                None
            }
        };
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
        Ok(status)
    }

    /// Close input, terminate, and kill if it does not exit within the timeout.
    pub async fn shutdown(mut self) {
        self.stdin.take();
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        terminate(&child);
        stop_within(&mut child, self.shutdown_timeout).await;
    }
}

impl Drop for TranscoderProcess {
    fn drop(&mut self) {
        self.stdin.take();
        let Some(mut child) = self.child.take() else {
            return;
        };
        if !matches!(child.try_wait(), Ok(None)) {
            return;
        }
        terminate(&child);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let timeout = self.shutdown_timeout;
                handle.spawn(async move {
                    stop_within(&mut child, timeout).await;
                });
            }
            Err(_) => {
                let _ = child.start_kill();
            }
        }
    }
}

async fn stop_within(child: &mut Child, timeout: Duration) {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(_) => tracing::debug!("Transcoder exited after terminate"),
        Err(_) => {
            tracing::warn!(pid = ?child.id(), "Transcoder ignored terminate, killing");
            if let Err(e) = child.kill().await {
                tracing::error!("Failed to kill transcoder: {}", e);
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain signal delivery to a pid we spawned and have not reaped.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "crooner::ffmpeg", "{}", line);
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}
