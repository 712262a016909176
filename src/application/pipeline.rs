//! Token source → chunker → speech → transcoder, for one session.

use crate::domain::av::{TranscodeCommand, TranscoderSettings, TranscoderSupervisor};
use crate::domain::chunk_log::ChunkLog;
use crate::domain::chunker::{Chunker, ChunkingPolicy, TextChunk};
use crate::domain::session::{FinalizeStats, ProgressEvent};
use crate::error::Result;
use crate::ports::speech::SpeechSynthesizer;
use crate::ports::tokens::TokenSource;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress goes out on an unbounded channel; sending never waits.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub session_id: String,
    pub prompt: String,
    pub lang: String,
    pub dir: PathBuf,
}

pub struct AudioPipeline<T, S> {
    tokens: T,
    speech: S,
    command: Arc<dyn TranscodeCommand>,
    settings: TranscoderSettings,
    chunking: ChunkingPolicy,
}

/// Per-run bookkeeping.
struct RunState<'a> {
    request: &'a PipelineRequest,
    log: ChunkLog,
    progress: &'a ProgressSender,
    saw_segment: bool,
}

impl RunState<'_> {
    fn emit(&self, event: ProgressEvent) {
        // Nobody listening is fine
        let _ = self.progress.send(event);
    }
}

impl<T, S> AudioPipeline<T, S>
where
    T: TokenSource,
    S: SpeechSynthesizer,
{
    pub fn new(
        tokens: T,
        speech: S,
        command: Arc<dyn TranscodeCommand>,
        settings: TranscoderSettings,
        chunking: ChunkingPolicy,
    ) -> Self {
        Self {
            tokens,
            speech,
            command,
            settings,
            chunking,
        }
    }

    pub fn chunking(&self) -> ChunkingPolicy {
        self.chunking
    }

    /// Run to completion.
    ///
    /// Once the transcoder is up, it is finalized exactly once and a
    /// `Done` event is sent, whether or not the token source failed. The
    /// error returned is the token source's, if any.
    pub async fn run(
        &self,
        request: &PipelineRequest,
        progress: &ProgressSender,
    ) -> Result<FinalizeStats> {
        tracing::info!(
            session_id = %request.session_id,
            lang = %request.lang,
            "Starting audio pipeline"
        );

        let log = ChunkLog::create(
            &request.dir,
            &request.prompt,
            &request.lang,
            self.chunking.chunk_words,
        )
        .await;

        let mut supervisor = match TranscoderSupervisor::start(
            &request.dir,
            self.settings.clone(),
            self.command.clone(),
        )
        .await
        {
            Ok(supervisor) => supervisor,
            Err(e) => {
                tracing::error!(session_id = %request.session_id, "Could not start transcoder: {}", e);
                return Err(e);
            }
        };

        let mut state = RunState {
            request,
            log,
            progress,
            saw_segment: false,
        };
        let mut chunker = Chunker::new(self.chunking);
        let outcome = self.feed(&mut chunker, &mut supervisor, &mut state).await;

        if let Some(chunk) = chunker.finish() {
            self.flush(chunk, &mut supervisor, &mut state).await;
        }

        let stats = supervisor.finalize().await;
        state.log.record_summary(chunker.flushed(), &stats).await;
        state.emit(ProgressEvent::Done(stats.clone()));

        tracing::info!(
            session_id = %request.session_id,
            chunks = stats.chunk_count,
            segments = stats.segment_count,
            restarts = stats.restarts,
            "Audio pipeline finished"
        );
        outcome.map(|()| stats)
    }

    async fn feed(
        &self,
        chunker: &mut Chunker,
        supervisor: &mut TranscoderSupervisor,
        state: &mut RunState<'_>,
    ) -> Result<()> {
        let mut tokens = match self.tokens.stream(&state.request.prompt).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(session_id = %state.request.session_id, "Token source failed to start: {}", e);
                return Err(e);
            }
        };

        while let Some(item) = tokens.next().await {
            match item {
                Ok(token) => {
                    if let Some(chunk) = chunker.push(&token) {
                        self.flush(chunk, supervisor, state).await;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %state.request.session_id,
                        "Token source failed, finishing with what was written: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn flush(
        &self,
        chunk: TextChunk,
        supervisor: &mut TranscoderSupervisor,
        state: &mut RunState<'_>,
    ) {
        state.log.record_chunk(&chunk).await;
        tracing::debug!(
            session_id = %state.request.session_id,
            chunk = chunk.seq,
            words = chunk.words,
            reason = ?chunk.reason,
            "Flushing text chunk"
        );

        let audio = match self.speech.synthesize(&chunk.text, &state.request.lang).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(
                    session_id = %state.request.session_id,
                    chunk = chunk.seq,
                    "Skipping chunk, synthesis failed: {}",
                    e
                );
                return;
            }
        };

        if !supervisor.write(&audio).await.delivered() {
            tracing::warn!(
                session_id = %state.request.session_id,
                chunk = chunk.seq,
                "Chunk audio was dropped"
            );
            return;
        }

        state.emit(ProgressEvent::Chunk {
            chunk_count: supervisor.chunk_count(),
        });
        if !state.saw_segment && supervisor.segment_count() > 0 {
            state.saw_segment = true;
            state.emit(ProgressEvent::FirstSegment);
        }
    }
}
