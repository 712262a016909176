//! Session record, progress events and the status view exposed to pollers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Ready,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Ready | SessionStatus::Error)
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_become(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Pending, _) => true,
            (Running, Ready) | (Running, Error) => true,
            _ => false,
        }
    }
}

/// Statistics reported by the transcoder once the stream is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeStats {
    pub segment_count: usize,
    pub chunk_count: usize,
    pub restarts: usize,
    pub dropped_writes: usize,
    pub playlist_path: PathBuf,
}

/// Messages sent from a running pipeline to the session record updater.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Chunk { chunk_count: usize },
    FirstSegment,
    Done(FinalizeStats),
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Chunk { .. } => "chunk",
            ProgressEvent::FirstSegment => "first_segment",
            ProgressEvent::Done(_) => "done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub status: SessionStatus,
    pub playlist_url: String,
    pub session_dir: PathBuf,
    pub error_message: Option<String>,
    pub last_event: Option<String>,
    pub chunk_count: usize,
    pub segment_count: usize,
    /// At least one media segment has been observed on disk
    pub playable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(session_id: &str, playlist_url: &str, session_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            status: SessionStatus::Pending,
            playlist_url: playlist_url.to_string(),
            session_dir,
            error_message: None,
            last_event: None,
            chunk_count: 0,
            segment_count: 0,
            playable: false,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Move to `next`, ignoring illegal transitions. Returns whether it moved.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if !self.status.can_become(next) {
            tracing::warn!(
                session_id = %self.session_id,
                "Ignoring status change {:?} -> {:?}",
                self.status,
                next
            );
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(self.updated_at);
        }
        true
    }

    /// Fold a progress event in. Nothing after `done` is applied.
    pub fn apply(&mut self, event: &ProgressEvent) {
        if self.last_event.as_deref() == Some("done") {
            return;
        }
        self.last_event = Some(event.name().to_string());
        self.updated_at = Utc::now();
        match event {
            ProgressEvent::Chunk { chunk_count } => self.chunk_count = *chunk_count,
            ProgressEvent::FirstSegment => self.playable = true,
            ProgressEvent::Done(stats) => {
                self.chunk_count = stats.chunk_count;
                self.segment_count = stats.segment_count;
                self.playable |= stats.segment_count > 0;
            }
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.transition(SessionStatus::Error) {
            self.error_message = Some(message.into());
        }
    }

    pub fn view(&self) -> StatusView {
        StatusView {
            state: self.status,
            event: self.last_event.clone(),
            chunk_count: self.chunk_count,
            segment_count: self.segment_count,
            playlist: self.playlist_url.clone(),
            playable: self.playable,
            error: self.error_message.clone(),
        }
    }
}

/// Read-only projection returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub state: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub chunk_count: usize,
    pub segment_count: usize,
    pub playlist: String,
    pub playable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
