//! Entry point for starting audio sessions and querying their progress.
//!
//! `begin` allocates a session directory, starts the pipeline in the
//! background and returns as soon as the first segment exists (or the
//! bootstrap timeout passes). A session only becomes `ready` once its
//! pipeline has actually finished; until then the record stays `running`
//! and `playable` tells pollers whether audio can already be fetched.
//!
//! Each session has exactly one writer for its record: an updater task
//! that drains the pipeline's progress channel, then records the final
//! outcome.

use super::bootstrap::{self, BootstrapOutcome, BootstrapPolicy};
use super::pipeline::{AudioPipeline, PipelineRequest, ProgressSender};
use crate::domain::session::{
    FinalizeStats, ProgressEvent, SessionRecord, SessionStatus, StatusView,
};
use crate::error::{Result, StreamError};
use crate::ports::repository::SessionRepository;
use crate::ports::speech::SpeechSynthesizer;
use crate::ports::storage::StoragePort;
use crate::ports::tokens::TokenSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub const DEFAULT_LANG: &str = "en";

fn default_lang() -> String {
    DEFAULT_LANG.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Overrides the configured bootstrap segment count
    #[serde(default)]
    pub min_segments: Option<usize>,
    /// Overrides the configured bootstrap timeout
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl StartRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            lang: default_lang(),
            session_id: None,
            min_segments: None,
            timeout_secs: None,
        }
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionHandle {
    pub session_id: String,
    #[serde(rename = "playlist")]
    pub playlist_url: String,
    /// Key for status queries; the same as the session id
    pub task_id: String,
    #[serde(skip)]
    pub bootstrap: Option<BootstrapOutcome>,
}

pub struct SessionService<St, R, T, S> {
    store: Arc<St>,
    repo: Arc<R>,
    pipeline: Arc<AudioPipeline<T, S>>,
    bootstrap: BootstrapPolicy,
}

impl<St, R, T, S> SessionService<St, R, T, S>
where
    St: StoragePort + 'static,
    R: SessionRepository + 'static,
    T: TokenSource + 'static,
    S: SpeechSynthesizer + 'static,
{
    pub fn new(
        store: Arc<St>,
        repo: Arc<R>,
        pipeline: Arc<AudioPipeline<T, S>>,
        bootstrap: BootstrapPolicy,
    ) -> Self {
        Self {
            store,
            repo,
            pipeline,
            bootstrap,
        }
    }

    /// Start a session. Only a missing prompt is reported as an error;
    /// every pipeline failure lands in the session record instead.
    pub async fn begin(&self, request: StartRequest) -> Result<SessionHandle> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(StreamError::InvalidRequest("prompt is required".into()));
        }
        let lang = match request.lang.trim() {
            "" => default_lang(),
            lang => lang.to_string(),
        };

        let location = self.store.create(request.session_id.as_deref()).await;
        let session_id = location.session_id.clone();

        let mut record = SessionRecord::new(&session_id, &location.playlist_url, location.path.clone());
        record.transition(SessionStatus::Running);
        self.save(&record).await;

        let (progress, events) = mpsc::unbounded_channel();
        let (finished_tx, mut finished) = watch::channel(false);

        let pipeline = self.pipeline.clone();
        let pipeline_request = PipelineRequest {
            session_id: session_id.clone(),
            prompt: prompt.to_string(),
            lang,
            dir: location.path.clone(),
        };
        // Only the pipeline holds a strong sender, so the channel closes when it ends
        let late_progress = progress.downgrade();
        let run = tokio::spawn(async move { pipeline.run(&pipeline_request, &progress).await });

        tokio::spawn(track(record, self.repo.clone(), events, run, finished_tx));

        let policy = BootstrapPolicy {
            timeout: request
                .timeout_secs
                .filter(|t| t.is_finite() && *t >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(self.bootstrap.timeout),
            min_segments: request.min_segments.unwrap_or(self.bootstrap.min_segments),
            ..self.bootstrap
        };
        let outcome = bootstrap::wait_for_segments(&location.path, policy, &mut finished).await;
        if outcome.has_audio() {
            if let Some(progress) = late_progress.upgrade() {
                send(&progress, ProgressEvent::FirstSegment);
            }
        }

        tracing::info!(
            session_id = %session_id,
            outcome = ?outcome,
            playlist = %location.playlist_url,
            "Session started"
        );

        Ok(SessionHandle {
            task_id: session_id.clone(),
            session_id,
            playlist_url: location.playlist_url,
            bootstrap: Some(outcome),
        })
    }

    pub async fn status(&self, task_id: &str) -> Result<Option<StatusView>> {
        Ok(self.repo.get(task_id).await?.map(|record| record.view()))
    }

    pub async fn record(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.repo.get(session_id).await
    }

    async fn save(&self, record: &SessionRecord) {
        if let Err(e) = self.repo.save(record).await {
            tracing::error!(session_id = %record.session_id, "Could not save session record: {}", e);
        }
    }
}

fn send(progress: &ProgressSender, event: ProgressEvent) {
    let _ = progress.send(event);
}

/// Sole writer of one session's record.
async fn track<R: SessionRepository>(
    mut record: SessionRecord,
    repo: Arc<R>,
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    run: JoinHandle<Result<FinalizeStats>>,
    finished: watch::Sender<bool>,
) {
    while let Some(event) = events.recv().await {
        record.apply(&event);
        if let Err(e) = repo.save(&record).await {
            tracing::warn!(session_id = %record.session_id, "Could not save progress: {}", e);
        }
    }

    match run.await {
        Ok(Ok(stats)) => {
            record.segment_count = stats.segment_count;
            record.transition(SessionStatus::Ready);
        }
        Ok(Err(e)) => {
            tracing::error!(session_id = %record.session_id, "Session failed: {}", e);
            record.fail(e.to_string());
        }
        Err(e) => {
            tracing::error!(session_id = %record.session_id, "Pipeline task aborted: {}", e);
            record.fail(format!("pipeline task aborted: {e}"));
        }
    }

    if let Err(e) = repo.save(&record).await {
        tracing::error!(session_id = %record.session_id, "Could not save final session state: {}", e);
    }
    let _ = finished.send(true);
}
