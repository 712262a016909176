//! Human-readable log of the text sent to synthesis, kept next to the segments.

use super::chunker::TextChunk;
use super::session::FinalizeStats;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

pub const CHUNK_LOG_NAME: &str = "text_chunks.log";

pub struct ChunkLog {
    path: PathBuf,
}

impl ChunkLog {
    /// Start a fresh log for a session. Failures are logged, never raised.
    pub async fn create(dir: &Path, prompt: &str, lang: &str, chunk_words: usize) -> Self {
        let log = Self {
            path: dir.join(CHUNK_LOG_NAME),
        };
        let header = format!(
            "=== Audio Generation Session ===\nTimestamp: {}\nOriginal prompt: {}\nLanguage: {}\n\
             Chunk words: {}\nOutput directory: {}\n\n=== Text Chunks ===\n\n",
            Utc::now().to_rfc3339(),
            prompt,
            lang,
            chunk_words,
            dir.display()
        );
        if let Err(e) = tokio::fs::write(&log.path, header).await {
            tracing::warn!(path = %log.path.display(), "Could not create chunk log: {}", e);
        }
        log
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record_chunk(&self, chunk: &TextChunk) {
        let label = if chunk.is_final() { "Final Chunk" } else { "Chunk" };
        let entry = format!(
            "=== {} #{} ({}) ===\n{}\n\n",
            label,
            chunk.seq,
            Utc::now().to_rfc3339(),
            chunk.text
        );
        self.append(&entry).await;
    }

    pub async fn record_summary(&self, chunks: usize, stats: &FinalizeStats) {
        let entry = format!(
            "\n=== Summary ===\nTotal chunks processed: {}\nChunks written: {}\nSegments: {}\n\
             Transcoder restarts: {}\nSession completed at: {}\nPlaylist path: {}\n",
            chunks,
            stats.chunk_count,
            stats.segment_count,
            stats.restarts,
            Utc::now().to_rfc3339(),
            stats.playlist_path.display()
        );
        self.append(&entry).await;
    }

    async fn append(&self, entry: &str) {
        let result = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), "Could not append to chunk log: {}", e);
        }
    }
}
