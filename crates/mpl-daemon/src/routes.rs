//! HTTP surface of mpl-daemon: health, status, the SSE feed and the manual
//! sync trigger.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use mpl_reconcile::SyncError;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::{
    api_types::{HealthResponse, SyncErrorResponse},
    state::{AppState, BusMsg, SyncTrigger},
};

/// Routes only. CORS and request tracing are layered on in `main.rs`, which
/// keeps the router usable from `tower::ServiceExt::oneshot` in tests.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/seasons/:season_id/sync", post(sync_season))
        .with_state(state)
}

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(st.snapshot().await))
}

// ---------------------------------------------------------------------------
// POST /v1/seasons/:season_id/sync
// ---------------------------------------------------------------------------

fn refuse(code: StatusCode, error: &str, season_id: Uuid, detail: Option<String>) -> Response {
    (
        code,
        Json(SyncErrorResponse {
            error: error.to_string(),
            season_id,
            detail,
        }),
    )
        .into_response()
}

/// Run one season's sync now. 409 while a scheduled or manual sync of the
/// same season is still running.
pub(crate) async fn sync_season(
    State(st): State<Arc<AppState>>,
    Path(season_id): Path<Uuid>,
) -> Response {
    let Some(res) = st.run_season(season_id, SyncTrigger::Manual).await else {
        return refuse(StatusCode::CONFLICT, "SYNC_IN_FLIGHT", season_id, None);
    };

    match res {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            let detail = Some(e.to_string());
            match e {
                SyncError::SeasonNotFound(_) => {
                    refuse(StatusCode::NOT_FOUND, "SEASON_NOT_FOUND", season_id, detail)
                }
                SyncError::Provider(_) => {
                    refuse(StatusCode::BAD_GATEWAY, "UPSTREAM_FAILED", season_id, detail)
                }
                SyncError::UnparseableRoundLabel(_) => refuse(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNPARSEABLE_LABEL",
                    season_id,
                    detail,
                ),
                SyncError::Cancelled => {
                    refuse(StatusCode::SERVICE_UNAVAILABLE, "CANCELLED", season_id, detail)
                }
                SyncError::Store(_) => refuse(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_FAILED",
                    season_id,
                    detail,
                ),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::SyncStarted { .. } => "sync_started",
                    BusMsg::SyncFinished(_) => "sync_finished",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
