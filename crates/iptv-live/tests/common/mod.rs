#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;

/// Channel id the mock panel always answers with HTTP 500.
pub const BROKEN_CHANNEL: u32 = 55;

#[derive(Clone, Default)]
pub struct PanelHits {
    pub total: Arc<AtomicUsize>,
}

impl PanelHits {
    pub fn count(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

async fn player_api(
    State(hits): State<PanelHits>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    hits.total.fetch_add(1, Ordering::SeqCst);
    let Some(id) = params.get("stream_id").and_then(|s| s.parse::<u32>().ok()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if id == BROKEN_CHANNEL {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    Json(json!({"epg_listings": [
        {"title": format!("Now on {}", id), "start_timestamp": "1700000000", "stop_timestamp": "1700003600"},
        {"title": format!("Next on {}", id), "start_timestamp": "1700003600", "stop_timestamp": "1700007200"}
    ]}))
    .into_response()
}

/// Fake content panel serving `player_api.php` on an ephemeral port.
pub async fn start_mock_panel() -> (SocketAddr, PanelHits) {
    let hits = PanelHits::default();
    let app = Router::new()
        .route("/player_api.php", get(player_api))
        .with_state(hits.clone());
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock panel");
    let addr = listener.local_addr().expect("mock panel addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, hits)
}
