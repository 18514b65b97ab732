//! Feed status, validation and sync endpoints

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use feedmirror_core::scheduler::FeedStatus;
use feedmirror_core::{FeedMirrorError, SyncMode, SyncReport, ValidationResult};

use crate::routes::{AppError, status_for};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feeds", get(list_feeds))
        .route("/feeds/{id}/validate", get(validate_feed))
        .route("/feeds/{id}/resync", post(resync_feed))
        .route("/feeds/{id}/sync", post(sync_feed))
}

/// GET /feeds - Configured feeds with their state and last run
async fn list_feeds(State(state): State<AppState>) -> Json<Vec<FeedStatus>> {
    Json(state.feedmirror().status())
}

/// GET /feeds/:id/validate - Compare the feed with its mirror
async fn validate_feed(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
) -> Result<Json<ValidationResult>, AppError> {
    let result = state.feedmirror().validate(&feed_id).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRequest {
    #[serde(default = "default_clear_existing")]
    pub clear_existing: bool,
}

fn default_clear_existing() -> bool {
    true
}

impl Default for ResyncRequest {
    fn default() -> Self {
        ResyncRequest {
            clear_existing: true,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponse {
    pub success: bool,
    pub feed_id: String,
    pub mode: SyncMode,
    pub cleared_count: usize,
    pub upserted_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl ResyncResponse {
    fn from_result(
        feed_id: String,
        mode: SyncMode,
        result: &Result<SyncReport, FeedMirrorError>,
    ) -> Self {
        match result {
            Ok(report) => ResyncResponse {
                success: true,
                feed_id,
                mode,
                cleared_count: report.cleared,
                upserted_count: report.upserted,
                error: None,
                kind: None,
            },
            Err(err) => {
                // Rows already removed by a broken resync still count as affected
                let (cleared_count, upserted_count) = match err {
                    FeedMirrorError::ResyncIncomplete {
                        cleared, restored, ..
                    } => (*cleared, *restored),
                    _ => (0, 0),
                };
                ResyncResponse {
                    success: false,
                    feed_id,
                    mode,
                    cleared_count,
                    upserted_count,
                    error: Some(err.to_string()),
                    kind: Some(err.kind()),
                }
            }
        }
    }
}

/// POST /feeds/:id/resync - Rebuild the mirror; `{"clearExisting": false}`
/// upserts without clearing
async fn resync_feed(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: ResyncRequest = if body.is_empty() {
        ResyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| FeedMirrorError::Config(format!("Invalid resync request: {}", e)))?
    };

    let mode = if request.clear_existing {
        SyncMode::ForcedResync
    } else {
        SyncMode::Incremental
    };

    let result = state.feedmirror().sync(&feed_id, mode).await;
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(err) => status_for(err),
    };

    Ok((status, Json(ResyncResponse::from_result(feed_id, mode, &result))).into_response())
}

/// POST /feeds/:id/sync - Incremental sync now
async fn sync_feed(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
) -> Result<Json<SyncReport>, AppError> {
    let report = state
        .feedmirror()
        .sync(&feed_id, SyncMode::Incremental)
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use feedmirror_core::fetch::StaticResponse;
    use feedmirror_core::{
        FeedConfig, FeedMirror, FeedMirrorConfig, MemoryMirror, Mirror, StaticFetcher,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const URL: &str = "https://calendar.example.com/team.ics";

    const FEED: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n\
BEGIN:VEVENT\r\nUID:standup\r\nSUMMARY:Standup\r\nDTSTART:20250301T090000Z\r\nDTEND:20250301T093000Z\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:retro\r\nSUMMARY:Retro\r\nDTSTART:20250302T150000Z\r\nEND:VEVENT\r\n\
END:VCALENDAR\r\n";

    struct Harness {
        app: Router,
        fetcher: Arc<StaticFetcher>,
        mirror: Arc<MemoryMirror>,
    }

    fn harness() -> Harness {
        let window_start = "2025-03-01".parse().unwrap();
        let window_end = "2025-03-02".parse().unwrap();
        let config = FeedMirrorConfig {
            feeds: vec![FeedConfig::new("team", URL).with_window(window_start, window_end)],
            ..Default::default()
        };
        let fetcher = Arc::new(StaticFetcher::with_body(URL, FEED));
        let mirror = Arc::new(MemoryMirror::new());
        let feedmirror = FeedMirror::with_parts(config, fetcher.clone(), mirror.clone());

        let app = Router::new()
            .merge(router())
            .with_state(AppState::new(feedmirror));

        Harness {
            app,
            fetcher,
            mirror,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validate_reports_missing_events_on_empty_mirror() {
        let h = harness();

        let (status, body) = send(&h.app, "GET", "/feeds/team/validate", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["icsEventCount"], 2);
        assert_eq!(body["dbEventCount"], 0);
        assert_eq!(body["missingInDb"], 2);
        assert_eq!(body["extraInDb"], 0);
        assert!(body["sampleComparison"]["icsEvents"].is_array());
        // Missing events plus the count discrepancy
        assert_eq!(body["recommendations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_resync_defaults_to_clearing() {
        let h = harness();
        let scope = feedmirror_core::FeedScope::new("team");

        let (status, body) = send(&h.app, "POST", "/feeds/team/resync", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["feedId"], "team");
        assert_eq!(body["mode"], "forced_resync");
        assert_eq!(body["clearedCount"], 0);
        assert_eq!(body["upsertedCount"], 2);
        assert!(body.get("error").is_none());
        assert_eq!(h.mirror.count(&scope).await.unwrap(), 2);

        let (_, after) = send(&h.app, "GET", "/feeds/team/validate", "").await;
        assert_eq!(after["missingInDb"], 0);
        assert_eq!(after["extraInDb"], 0);
    }

    #[tokio::test]
    async fn test_resync_without_clearing_runs_incremental() {
        let h = harness();

        let (status, body) = send(
            &h.app,
            "POST",
            "/feeds/team/resync",
            r#"{"clearExisting": false}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "incremental");
        assert_eq!(body["clearedCount"], 0);
    }

    #[tokio::test]
    async fn test_unknown_feed_is_404() {
        let h = harness();

        let (status, body) = send(&h.app, "GET", "/feeds/nope/validate", "").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "feed_not_found");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_502_and_keeps_mirror() {
        let h = harness();
        let scope = feedmirror_core::FeedScope::new("team");
        send(&h.app, "POST", "/feeds/team/sync", "").await;
        h.fetcher.set_response(URL, StaticResponse::Status(503));

        let (status, body) = send(&h.app, "GET", "/feeds/team/validate", "").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "http_status");
        assert!(body.get("icsEventCount").is_none());

        let (status, body) = send(&h.app, "POST", "/feeds/team/resync", "").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["clearedCount"], 0);
        assert_eq!(h.mirror.count(&scope).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_feeds_shows_last_run() {
        let h = harness();
        let (status, _) = send(&h.app, "POST", "/feeds/team/sync", "").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&h.app, "GET", "/feeds", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["feed_id"], "team");
        assert_eq!(body[0]["state"]["state"], "idle");
        assert_eq!(body[0]["last_run"]["outcome"]["status"], "succeeded");
    }
}
