//! Remote-control HTTP API.
//!
//! Every write endpoint turns into a `LiveEvent` for the core; reads come
//! straight from the published snapshot and the EPG cache.  Routes accept
//! both GET and POST so a browser bookmark or `curl` works equally.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use iptv_proto::protocol::{
    LiveCommand, LiveSnapshot, QualityLevel, RemoteKey, SurfaceEvent, SurfaceTelemetry,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::core::LiveEvent;
use crate::epg::{EpgCache, EpgRecord};

#[derive(Clone)]
pub struct HttpState {
    pub snapshot: Arc<RwLock<LiveSnapshot>>,
    pub epg: Arc<EpgCache>,
    pub event_tx: mpsc::Sender<LiveEvent>,
}

#[derive(Debug, Deserialize)]
struct GenerationQuery {
    generation: Option<u64>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/open/:idx", get(open).post(open))
        .route("/api/switch/:idx", get(switch_to).post(switch_to))
        .route("/api/next", get(next).post(next))
        .route("/api/prev", get(prev).post(prev))
        .route("/api/close", get(close).post(close))
        .route("/api/key/:key", get(key).post(key))
        .route("/api/quality/:level", get(quality).post(quality))
        .route("/api/fullscreen/:on", get(fullscreen).post(fullscreen))
        .route("/api/epg/:id", get(get_epg))
        .route("/api/surface/telemetry", post(telemetry))
        .route("/api/surface/:event", get(surface_event).post(surface_event))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state: HttpState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn send(state: &HttpState, evt: LiveEvent) -> StatusCode {
    if let Err(e) = state.event_tx.send(evt).await {
        error!("HTTP API: core is gone, dropping {:?}", e.0);
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

async fn command(state: &HttpState, cmd: LiveCommand) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    send(state, LiveEvent::Command(cmd)).await
}

async fn get_state(State(state): State<HttpState>) -> Json<LiveSnapshot> {
    Json(state.snapshot.read().await.clone())
}

async fn open(State(state): State<HttpState>, Path(index): Path<usize>) -> StatusCode {
    command(&state, LiveCommand::Open { index }).await
}

async fn switch_to(State(state): State<HttpState>, Path(index): Path<usize>) -> StatusCode {
    command(&state, LiveCommand::SwitchTo { index }).await
}

async fn next(State(state): State<HttpState>) -> StatusCode {
    command(&state, LiveCommand::Next).await
}

async fn prev(State(state): State<HttpState>) -> StatusCode {
    command(&state, LiveCommand::Prev).await
}

async fn close(State(state): State<HttpState>) -> StatusCode {
    command(&state, LiveCommand::Close).await
}

async fn key(State(state): State<HttpState>, Path(raw): Path<String>) -> StatusCode {
    match raw.parse::<RemoteKey>() {
        Ok(key) => command(&state, LiveCommand::Key { key }).await,
        Err(e) => {
            warn!("HTTP API: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

async fn quality(State(state): State<HttpState>, Path(raw): Path<String>) -> StatusCode {
    match raw.parse::<QualityLevel>() {
        Ok(level) => command(&state, LiveCommand::SelectQuality { level }).await,
        Err(e) => {
            warn!("HTTP API: {}", e);
            StatusCode::BAD_REQUEST
        }
    }
}

async fn fullscreen(State(state): State<HttpState>, Path(on): Path<bool>) -> StatusCode {
    command(&state, LiveCommand::SetFullscreen { on }).await
}

async fn get_epg(
    State(state): State<HttpState>,
    Path(id): Path<u32>,
) -> Result<Json<EpgRecord>, StatusCode> {
    state.epg.get_for(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn telemetry(
    State(state): State<HttpState>,
    Json(telemetry): Json<SurfaceTelemetry>,
) -> StatusCode {
    send(&state, LiveEvent::Telemetry(telemetry)).await
}

async fn surface_event(
    State(state): State<HttpState>,
    Path(raw): Path<String>,
    Query(query): Query<GenerationQuery>,
) -> StatusCode {
    let event = match raw.parse::<SurfaceEvent>() {
        Ok(event) => event,
        Err(e) => {
            warn!("HTTP API: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    send(
        &state,
        LiveEvent::Surface {
            event,
            generation: query.generation,
        },
    )
    .await
}
