//! Convert a text into an HLS audio directory, one chunk at a time.

use clap::Parser;
use crooner::adapters::local::{SegmentStore, StaticText};
use crooner::adapters::tts::GoogleTts;
use crooner::application::pipeline::{AudioPipeline, PipelineRequest};
use crooner::domain::av::FfmpegHlsCommand;
use crooner::domain::chunker::ChunkingPolicy;
use crooner::ports::storage::StoragePort;
use crooner::{StreamConfig, StreamError};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Convert text to HLS audio with Google Text-to-Speech
#[derive(Parser, Debug)]
#[command(name = "text_to_hls", version)]
struct Cli {
    /// Text to speak; read from --text-file or stdin when absent
    text: Option<String>,

    /// Path to a text file
    #[arg(long, short = 't', value_name = "PATH")]
    text_file: Option<PathBuf>,

    /// Output directory (default: a new session under the HLS root)
    #[arg(long, short = 'o', value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Language code (e.g., en, fr, es)
    #[arg(long, short = 'l', default_value = "en")]
    language: String,

    /// Segment duration in seconds
    #[arg(long, short = 'd', value_name = "SECONDS")]
    segment_duration: Option<u64>,

    /// Words per chunk
    #[arg(long, value_name = "WORDS")]
    chunk_size: Option<usize>,

    /// Words in the first chunk
    #[arg(long, value_name = "WORDS")]
    first_chunk_size: Option<usize>,
}

fn read_text(cli: &Cli) -> crooner::Result<String> {
    if let Some(text) = &cli.text {
        return Ok(text.clone());
    }
    if let Some(path) = &cli.text_file {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

#[tokio::main]
async fn main() -> crooner::Result<()> {
    let cli = Cli::parse();
    let config = StreamConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let text = read_text(&cli)?;
    if text.trim().is_empty() {
        return Err(StreamError::InvalidRequest("no text given".into()));
    }

    let (session_id, dir) = match &cli.output_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            let id = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("cli")
                .to_string();
            (id, dir.clone())
        }
        None => {
            let location = SegmentStore::new(&config.storage).create(None).await;
            (location.session_id, location.path)
        }
    };

    let mut transcoder = config.transcoder.clone();
    if let Some(seconds) = cli.segment_duration {
        transcoder.segment_seconds = seconds.max(1);
    }
    let chunking = ChunkingPolicy::new(
        cli.first_chunk_size.unwrap_or(config.chunking.first_chunk_words),
        cli.chunk_size.unwrap_or(config.chunking.chunk_words),
    );

    let pipeline = AudioPipeline::new(
        StaticText::echo(),
        GoogleTts::new(config.tts_endpoint.clone())?,
        Arc::new(FfmpegHlsCommand),
        transcoder,
        chunking,
    );

    // Progress is logged by the pipeline itself
    let (progress, _events) = mpsc::unbounded_channel();
    let request = PipelineRequest {
        session_id,
        prompt: text,
        lang: cli.language.clone(),
        dir,
    };
    let stats = pipeline.run(&request, &progress).await?;

    println!("Playlist: {}", stats.playlist_path.display());
    println!(
        "Chunks: {}  Segments: {}  Restarts: {}  Dropped writes: {}",
        stats.chunk_count, stats.segment_count, stats.restarts, stats.dropped_writes
    );
    Ok(())
}
