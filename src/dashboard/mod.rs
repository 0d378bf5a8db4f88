//! Dashboard: Axum web server for the live view.
//!
//! Serves a REST API and a self-contained HTML page that renders
//! `/api/view`. CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{AppState, DashboardState};

/// The embedded dashboard HTML (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Serve the dashboard until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Dashboard server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Dashboard server error")?;

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // API routes
        .route("/api/view", get(routes::get_view))
        .route("/api/signals", get(routes::get_signals))
        .route("/api/picks", get(routes::get_picks))
        .route("/api/status", get(routes::get_status))
        .route("/api/refresh", post(routes::post_refresh))
        .route("/health", get(routes::health))
        // Dashboard HTML
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML dashboard.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FeedSynchronizer;
    use crate::store::MockRecordStore;
    use crate::types::{SoccerPick, TradingSignal};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut store = MockRecordStore::new();
        store
            .expect_recent_signals()
            .returning(|_| Ok(vec![TradingSignal::sample("s1", "FIRE", 0)]));
        store
            .expect_recent_picks()
            .returning(|_| Ok(vec![SoccerPick::sample("p1", 0)]));
        let sync = FeedSynchronizer::new(Arc::new(store), None, 20);
        Arc::new(DashboardState::new("Opus Quant Dashboard", sync))
    }

    async fn loaded_state() -> AppState {
        let state = test_state();
        state.sync.refresh().await;
        state
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_view_defaults_to_futures() {
        let (status, json) = get_json(build_router(loaded_state().await), "/api/view").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"], "futures");
        assert_eq!(json["signals"]["items"][0]["quality"], "🔥 FIRE");
    }

    #[tokio::test]
    async fn test_view_soccer_tab() {
        let (status, json) =
            get_json(build_router(loaded_state().await), "/api/view?tab=soccer").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"], "soccer");
        assert_eq!(json["picks"]["items"][0]["prediction"]["label"], "OVER 2.5");
    }

    #[tokio::test]
    async fn test_view_tab_is_case_insensitive() {
        let state = loaded_state().await;
        let (status, json) = get_json(build_router(state.clone()), "/api/view?tab=Soccer").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"], "soccer");

        let (status, json) = get_json(build_router(state), "/api/view?tab=FUTURES").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["view"], "futures");
    }

    #[tokio::test]
    async fn test_view_loading_before_refresh() {
        let (_, json) = get_json(build_router(test_state()), "/api/view?tab=soccer").await;
        assert_eq!(json["view"], "loading");
    }

    #[tokio::test]
    async fn test_view_rejects_unknown_tab() {
        let (status, _) =
            get_json(build_router(loaded_state().await), "/api/view?tab=tennis").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signals_and_picks_endpoints() {
        let state = loaded_state().await;
        let (status, signals) = get_json(build_router(state.clone()), "/api/signals").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(signals[0]["id"], "s1");

        let (status, picks) = get_json(build_router(state), "/api/picks").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(picks[0]["match"], "Arsenal vs Chelsea");
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (status, json) = get_json(build_router(loaded_state().await), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["loading"], false);
        assert_eq!(json["signals_held"], 1);
    }

    #[tokio::test]
    async fn test_refresh_accepted() {
        let state = test_state();
        let app = build_router(state.clone());
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while state.sync.snapshot().await.loading {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(state.sync.snapshot().await.signals.len(), 1);
    }

    #[tokio::test]
    async fn test_dashboard_html() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Opus Quant Dashboard"));
        assert!(html.contains("/api/view"));
    }
}
