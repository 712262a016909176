//! HTTP inbound adapter.
//!
//! Starts sessions, answers status polls and serves the HLS tree.

pub mod audiostream;

use crate::application::session::{SessionHandle, SessionService, StartRequest};
use crate::domain::session::StatusView;
use crate::error::Result;
use crate::ports::repository::SessionRepository;
use crate::ports::speech::SpeechSynthesizer;
use crate::ports::storage::StoragePort;
use crate::ports::tokens::TokenSource;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// What the routes need from the application layer.
#[async_trait]
pub trait AudioSessions: Send + Sync {
    async fn begin(&self, request: StartRequest) -> Result<SessionHandle>;
    async fn status(&self, task_id: &str) -> Result<Option<StatusView>>;
}

#[async_trait]
impl<St, R, T, S> AudioSessions for SessionService<St, R, T, S>
where
    St: StoragePort + 'static,
    R: SessionRepository + 'static,
    T: TokenSource + 'static,
    S: SpeechSynthesizer + 'static,
{
    async fn begin(&self, request: StartRequest) -> Result<SessionHandle> {
        SessionService::begin(self, request).await
    }

    async fn status(&self, task_id: &str) -> Result<Option<StatusView>> {
        SessionService::status(self, task_id).await
    }
}

pub type SharedSessions = Arc<dyn AudioSessions>;

/// Where the session directories are published over HTTP.
pub struct StaticFiles {
    /// URL path prefix, e.g. `/media/hls`
    pub mount: String,
    pub dir: PathBuf,
}

impl StaticFiles {
    /// Derive the mount point from the public playlist base URL. Absolute
    /// URLs point at some other server, so nothing is mounted for them.
    pub fn from_base_url(base_url: &str, dir: PathBuf) -> Option<Self> {
        let mount = base_url.trim_end_matches('/');
        if !mount.starts_with('/') || mount.is_empty() {
            return None;
        }
        Some(Self {
            mount: mount.to_string(),
            dir,
        })
    }
}

pub fn router(sessions: SharedSessions, static_files: Option<StaticFiles>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/audiostream/start/", post(audiostream::start::handle))
        .route(
            "/audiostream/task-status/:task_id/",
            get(audiostream::status::handle),
        );

    if let Some(files) = static_files {
        tracing::info!(mount = %files.mount, dir = %files.dir.display(), "Serving HLS files");
        router = router.nest_service(&files.mount, ServeDir::new(files.dir));
    }

    router.layer(cors).with_state(sessions)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::SessionStatus;
    use crate::error::StreamError;
    use serde_json::Value;
    use tempfile::tempdir;

    struct FakeSessions;

    #[async_trait]
    impl AudioSessions for FakeSessions {
        async fn begin(&self, request: StartRequest) -> Result<SessionHandle> {
            if request.prompt.trim().is_empty() {
                return Err(StreamError::InvalidRequest("prompt is required".into()));
            }
            Ok(SessionHandle {
                session_id: "abc".into(),
                playlist_url: "/media/hls/abc/audio.m3u8".into(),
                task_id: "abc".into(),
                bootstrap: None,
            })
        }

        async fn status(&self, task_id: &str) -> Result<Option<StatusView>> {
            Ok((task_id == "abc").then(|| StatusView {
                state: SessionStatus::Running,
                event: Some("chunk".into()),
                chunk_count: 2,
                segment_count: 0,
                playlist: "/media/hls/abc/audio.m3u8".into(),
                playable: true,
                error: None,
            }))
        }
    }

    async fn serve(static_files: Option<StaticFiles>) -> String {
        let app = router(Arc::new(FakeSessions), static_files);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_start_returns_session_handle() {
        let base = serve(None).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/audiostream/start/"))
            .json(&serde_json::json!({"prompt": "Tell me a story", "lang": "fr"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["session_id"], "abc");
        assert_eq!(body["task_id"], "abc");
        assert_eq!(body["playlist"], "/media/hls/abc/audio.m3u8");
    }

    #[tokio::test]
    async fn test_start_without_prompt_is_bad_request() {
        let base = serve(None).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/audiostream/start/"))
            .json(&serde_json::json!({"lang": "en"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("prompt"));

        let response = client
            .post(format!("{base}/audiostream/start/"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_status_known_and_unknown() {
        let base = serve(None).await;
        let response = reqwest::get(format!("{base}/audiostream/task-status/abc/"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["state"], "running");
        assert_eq!(body["chunk_count"], 2);

        let response = reqwest::get(format!("{base}/audiostream/task-status/nope/"))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_serves_session_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("abc")).unwrap();
        std::fs::write(dir.path().join("abc/audio.m3u8"), "#EXTM3U\n").unwrap();

        let files = StaticFiles::from_base_url("/media/hls/", dir.path().to_path_buf());
        let base = serve(files).await;
        let response = reqwest::get(format!("{base}/media/hls/abc/audio.m3u8"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "#EXTM3U\n");
    }

    #[test]
    fn test_absolute_base_url_mounts_nothing() {
        assert!(StaticFiles::from_base_url("https://cdn.example.com/hls/", PathBuf::new()).is_none());
        assert!(StaticFiles::from_base_url("/", PathBuf::new()).is_none());
        let files = StaticFiles::from_base_url("/media/hls/", PathBuf::from("/srv")).unwrap();
        assert_eq!(files.mount, "/media/hls");
    }
}
