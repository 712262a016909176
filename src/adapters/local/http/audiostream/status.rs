use super::super::{error_response, SharedSessions};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub async fn handle(State(sessions): State<SharedSessions>, Path(task_id): Path<String>) -> Response {
    match sessions.status(&task_id).await {
        Ok(Some(view)) => Json(view).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("unknown task {task_id}")),
        Err(e) => {
            tracing::error!(task_id = %task_id, "Status lookup failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
