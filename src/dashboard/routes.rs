//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::engine::{FeedSynchronizer, SyncStats};
use crate::types::{SoccerPick, Tab, TradingSignal};
use crate::view::{self, View};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub title: String,
    pub sync: FeedSynchronizer,
}

impl DashboardState {
    pub fn new(title: impl Into<String>, sync: FeedSynchronizer) -> Self {
        Self {
            title: title.into(),
            sync,
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub tab: Tab,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub title: String,
    pub loading: bool,
    pub subscribed: bool,
    pub signals_held: usize,
    pub picks_held: usize,
    pub fetch_limit: usize,
    pub stats: SyncStats,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/view?tab=futures|soccer
pub async fn get_view(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Json<View> {
    let snapshot = state.sync.snapshot().await;
    Json(view::project(&snapshot, query.tab))
}

/// GET /api/signals
pub async fn get_signals(State(state): State<AppState>) -> Json<Vec<TradingSignal>> {
    Json(state.sync.snapshot().await.signals)
}

/// GET /api/picks
pub async fn get_picks(State(state): State<AppState>) -> Json<Vec<SoccerPick>> {
    Json(state.sync.snapshot().await.picks)
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.sync.snapshot().await;
    Json(StatusResponse {
        title: state.title.clone(),
        loading: snapshot.loading,
        subscribed: state.sync.is_subscribed().await,
        signals_held: snapshot.signals.len(),
        picks_held: snapshot.picks.len(),
        fetch_limit: state.sync.fetch_limit(),
        stats: state.sync.stats().await,
    })
}

/// POST /api/refresh: runs in the background; poll /api/status.
pub async fn post_refresh(State(state): State<AppState>) -> StatusCode {
    debug!("Manual refresh requested");
    let sync = state.sync.clone();
    tokio::spawn(async move { sync.refresh().await });
    StatusCode::ACCEPTED
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
