#![cfg(unix)]

use async_trait::async_trait;
use bytes::Bytes;
use crooner::adapters::local::http::{self, StaticFiles};
use crooner::adapters::local::{MemoryRepository, SegmentStore, StaticText};
use crooner::application::bootstrap::BootstrapPolicy;
use crooner::application::{AudioPipeline, SessionService};
use crooner::domain::av::{TranscodeCommand, TranscoderSettings};
use crooner::domain::chunk_log::CHUNK_LOG_NAME;
use crooner::domain::chunker::ChunkingPolicy;
use crooner::hls;
use crooner::ports::speech::SpeechSynthesizer;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

/// Stands in for ffmpeg: one segment right away, one more at end of input.
struct FakeSegmenter;

impl TranscodeCommand for FakeSegmenter {
    fn build(&self, output_dir: &Path, _settings: &TranscoderSettings) -> TokioCommand {
        let mut command = TokioCommand::new("sh");
        command
            .arg("-c")
            .arg("touch segment_000.m4s; cat > input.mp3; touch segment_001.m4s")
            .current_dir(output_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[derive(Default)]
struct CountingSpeech {
    calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesizer for CountingSpeech {
    async fn synthesize(&self, text: &str, _lang: &str) -> crooner::Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(format!("<{text}>")))
    }
}

#[tokio::test]
async fn test_http_session_runs_to_ready() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(SegmentStore::at(root.path(), "/media/hls/"));
    let repo = Arc::new(MemoryRepository::new());

    let pipeline = Arc::new(AudioPipeline::new(
        StaticText::echo(),
        CountingSpeech::default(),
        Arc::new(FakeSegmenter),
        TranscoderSettings {
            finalize_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_millis(500),
            ..Default::default()
        },
        ChunkingPolicy::new(3, 5),
    ));
    let sessions = Arc::new(SessionService::new(
        store.clone(),
        repo,
        pipeline,
        BootstrapPolicy {
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
    ));

    let app = http::router(
        sessions,
        StaticFiles::from_base_url("/media/hls/", root.path().to_path_buf()),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let started: Value = client
        .post(format!("{base}/audiostream/start/"))
        .json(&serde_json::json!({
            "prompt": "One two three four. Five six seven eight nine ten eleven twelve",
            "lang": "en",
            "session_id": "flow"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["session_id"], "flow");
    assert_eq!(started["playlist"], "/media/hls/flow/audio.m3u8");

    let manifest = client
        .get(format!("{base}/media/hls/flow/audio.m3u8"))
        .send()
        .await
        .unwrap();
    assert_eq!(manifest.status(), 200);
    assert!(hls::parse(&manifest.text().await.unwrap()).is_ok());

    let mut status = Value::Null;
    for _ in 0..250 {
        status = client
            .get(format!("{base}/audiostream/task-status/flow/"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if status["state"] == "ready" || status["state"] == "error" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(status["state"], "ready");
    assert_eq!(status["event"], "done");
    assert_eq!(status["playable"], true);
    // "One two three" / "four." / "Five .. nine" / "ten eleven twelve"
    assert_eq!(status["chunk_count"], 4);
    assert_eq!(status["segment_count"], 2);

    let dir = root.path().join("flow");
    let fed = std::fs::read_to_string(dir.join("input.mp3")).unwrap();
    assert_eq!(
        fed,
        "<One two three><four.><Five six seven eight nine><ten eleven twelve>"
    );
    let log = std::fs::read_to_string(dir.join(CHUNK_LOG_NAME)).unwrap();
    assert!(log.contains("=== Final Chunk #4"));
}
