//! Server Binary - HTTP service for live text-to-audio sessions
//!
//! It wires up:
//! - Local adapters (segment store, in-memory session records)
//! - LLM token source and Google speech synthesizer
//! - HTTP inbound adapter and static HLS files
//! - Optional retention sweeper

use crooner::adapters::llm::OpenAiTokenSource;
use crooner::adapters::local::http::{self, StaticFiles};
use crooner::adapters::local::{MemoryRepository, SegmentStore};
use crooner::adapters::tts::GoogleTts;
use crooner::application::bootstrap::BootstrapPolicy;
use crooner::application::retention::RetentionSweeper;
use crooner::application::{AudioPipeline, SessionService};
use crooner::domain::av::FfmpegHlsCommand;
use crooner::StreamConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = StreamConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Adapters (Local implementations)
    let store = Arc::new(SegmentStore::new(&config.storage));
    let repo = Arc::new(MemoryRepository::new());

    let tokens = match OpenAiTokenSource::new(config.llm.clone()) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to set up LLM client: {}", e);
            std::process::exit(1);
        }
    };
    let speech = match GoogleTts::new(config.tts_endpoint.clone()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to set up speech client: {}", e);
            std::process::exit(1);
        }
    };

    // 2. Application Services
    let pipeline = Arc::new(AudioPipeline::new(
        tokens,
        speech,
        Arc::new(FfmpegHlsCommand),
        config.transcoder.clone(),
        config.chunking,
    ));
    let sessions = Arc::new(SessionService::new(
        store.clone(),
        repo.clone(),
        pipeline,
        BootstrapPolicy {
            timeout: config.bootstrap_timeout,
            min_segments: config.bootstrap_min_segments,
            ..Default::default()
        },
    ));

    // 3. Retention
    let cancel = CancellationToken::new();
    let sweeper = config
        .retention
        .map(|ttl| RetentionSweeper::new(store.clone(), repo.clone(), ttl).spawn(cancel.clone()));

    // 4. HTTP Layer
    let static_files =
        StaticFiles::from_base_url(&config.storage.base_url, store.public_dir().to_path_buf());
    let app = http::router(sessions, static_files);

    // 5. Start Server
    let bind = format!("{}:{}", config.addr, config.port);
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", bind, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening at {}", bind);

    let shutdown = cancel.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await;
    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
    }

    cancel.cancel();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
}
