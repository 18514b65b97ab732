pub mod feeds;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use feedmirror_core::FeedMirrorError;
use serde::Serialize;

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

/// Converts errors to HTTP responses, keeping the feedmirror error kind
pub struct AppError(anyhow::Error);

pub fn status_for(err: &FeedMirrorError) -> StatusCode {
    match err {
        FeedMirrorError::FeedNotFound(_) => StatusCode::NOT_FOUND,
        FeedMirrorError::SyncInProgress(_) => StatusCode::CONFLICT,
        FeedMirrorError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_transport() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match self.0.downcast_ref::<FeedMirrorError>() {
            Some(err) => (status_for(err), err.kind()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            kind,
        });
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
