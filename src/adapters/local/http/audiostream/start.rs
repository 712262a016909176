use super::super::{error_response, SharedSessions};
use crate::application::session::StartRequest;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub async fn handle(
    State(sessions): State<SharedSessions>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    match sessions.begin(request).await {
        Ok(handle) => Json(handle).into_response(),
        Err(e) if e.is_caller_error() => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            tracing::error!("Could not start audio session: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
