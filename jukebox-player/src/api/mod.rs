//! HTTP surface
//!
//! A thin observation layer: health, current status snapshots, and SSE
//! streams fed by the status broadcaster. Playback control happens over
//! richer internal interfaces; this keeps the daemon inspectable from a
//! browser or curl without any of those.

use crate::playback::PlaybackManager;
use crate::status::StatusBroadcaster;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use jukebox_common::db::speakers;
use jukebox_common::{Error, Status};
use serde_json::json;
use sqlx::SqlitePool;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub manager: Arc<PlaybackManager>,
    pub broadcaster: Arc<StatusBroadcaster>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/speakers/:id/status", get(speaker_status))
        .route("/api/v1/speakers/:id/events", get(speaker_events))
        .route("/api/v1/events", get(all_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the shutdown future resolves
pub async fn serve(
    bind_addr: &str,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("HTTP server listening on {}", bind_addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "service": "jukebox-player",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// GET /api/v1/speakers/:id/status - current snapshot for one speaker
async fn speaker_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Status>, (StatusCode, Json<serde_json::Value>)> {
    let speaker_id = parse_id(&id)?;
    let status = state
        .manager
        .status(speaker_id)
        .await
        .map_err(error_response)?;
    Ok(Json(status))
}

/// GET /api/v1/speakers/:id/events - SSE stream for one speaker: current
/// snapshot first (when one exists), then every subsequent change.
/// Unknown speakers are rejected before any channel is created for them.
async fn speaker_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<serde_json::Value>)>
{
    let speaker_id = parse_id(&id)?;
    speakers::get_speaker(&state.db, &speaker_id.to_string())
        .await
        .map_err(error_response)?;
    debug!(speaker = %speaker_id, "SSE client connected");

    let (snapshot, rx) = state.broadcaster.subscribe(speaker_id);
    let initial = stream::iter(snapshot.into_iter().filter_map(status_event));
    let live = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(status) => status_event(status),
            Err(e) => {
                warn!("SSE stream lagged: {:?}", e);
                None
            }
        }
    });

    Ok(sse_response(initial.chain(live)))
}

/// GET /api/v1/events - SSE stream across all speakers: every known
/// snapshot first, then every change on any speaker
async fn all_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("global SSE client connected");

    let (snapshots, rx) = state.broadcaster.subscribe_all();
    let initial = stream::iter(snapshots.into_iter().filter_map(status_event));
    let live = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(status) => status_event(status),
            Err(e) => {
                warn!("SSE stream lagged: {:?}", e);
                None
            }
        }
    });

    sse_response(initial.chain(live))
}

fn sse_response<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}

fn status_event(status: Status) -> Option<Result<Event, Infallible>> {
    match serde_json::to_string(&status) {
        Ok(json) => Some(Ok(Event::default().event("status").data(json))),
        Err(e) => {
            warn!("could not serialize status: {}", e);
            None
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid, (StatusCode, Json<serde_json::Value>)> {
    Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_id", "message": format!("not a valid speaker id: {}", id) })),
        )
    })
}

fn error_response(error: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &error {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::ChannelTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::ChannelUnavailable(_) | Error::ChannelClosed(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "error": error.code(), "message": error.to_string() })),
    )
}
