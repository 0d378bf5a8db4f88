//! Opus Quant Dashboard
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects the feed synchronizer to the store, and serves the
//! dashboard until Ctrl+C.

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use opus_dashboard::config::{self, AppConfig};
use opus_dashboard::dashboard::{self, DashboardState};
use opus_dashboard::engine::FeedSynchronizer;
use opus_dashboard::store::realtime::RealtimeClient;
use opus_dashboard::store::supabase::SupabaseStore;
use opus_dashboard::store::{ChangeFeed, RecordStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("OPUS_CONFIG").unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    info!(
        title = %cfg.dashboard.title,
        port = cfg.dashboard.port,
        signals_table = %cfg.store.signals_table,
        picks_table = %cfg.store.picks_table,
        fetch_limit = cfg.store.fetch_limit,
        "Dashboard starting up"
    );

    // -- Store clients ---------------------------------------------------

    let base_url = AppConfig::resolve_env(&cfg.store.url_env)?;
    let api_key = SecretString::new(AppConfig::resolve_env(&cfg.store.api_key_env)?);
    let tables = cfg.store.tables();

    let store: Arc<dyn RecordStore> = Arc::new(
        SupabaseStore::new(
            &base_url,
            api_key.clone(),
            tables.clone(),
            cfg.store.request_timeout(),
        )
        .context("Failed to build store client")?,
    );

    let feed: Option<Arc<dyn ChangeFeed>> = if cfg.realtime.enabled {
        let client = RealtimeClient::new(
            &base_url,
            api_key,
            &cfg.realtime.schema,
            tables,
            Duration::from_secs(cfg.realtime.heartbeat_secs),
            Duration::from_secs(cfg.realtime.reconnect_delay_secs),
        )
        .context("Failed to build realtime client")?;
        let client: Arc<dyn ChangeFeed> = Arc::new(client);
        Some(client)
    } else {
        warn!("Realtime disabled; snapshot refreshes only via POST /api/refresh");
        None
    };

    // -- Synchronizer + dashboard ----------------------------------------

    let sync = FeedSynchronizer::new(store, feed, cfg.store.fetch_limit);
    sync.start().await;

    let state = Arc::new(DashboardState::new(cfg.dashboard.title.clone(), sync.clone()));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C; running until killed");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received.");
    };

    let served = dashboard::serve(state, cfg.dashboard.port, shutdown).await;

    sync.stop().await;
    info!("Dashboard shut down cleanly.");
    served
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("opus_dashboard=info"));

    let json_logging = std::env::var("OPUS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
