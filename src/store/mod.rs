//! Remote store integrations.
//!
//! Defines the `RecordStore` (query) and `ChangeFeed` (notification)
//! traits the synchronizer depends on, and provides implementations for:
//! - Supabase PostgREST: recent-rows reads
//! - Supabase Realtime: row change subscription over websocket

pub mod realtime;
pub mod supabase;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::types::{ChangeEvent, RecordKind, SoccerPick, TradingSignal};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Request to {table} failed: {source}")]
    Http {
        table: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Store returned {status} for {table}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {table} rows: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
}

// ---------------------------------------------------------------------------
// Query interface
// ---------------------------------------------------------------------------

/// Read access to the most recent records of each kind.
///
/// Implementors return rows ordered by `created_at` descending, at most
/// `limit` of them. An empty table is `Ok(vec![])`, not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn recent_signals(&self, limit: usize) -> Result<Vec<TradingSignal>, StoreError>;

    async fn recent_picks(&self, limit: usize) -> Result<Vec<SoccerPick>, StoreError>;
}

/// Table name per record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub signals: String,
    pub picks: String,
}

impl TableNames {
    pub fn table(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Signals => &self.signals,
            RecordKind::Picks => &self.picks,
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            signals: "session_analysis".to_string(),
            picks: "model_predictions".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Change notification interface
// ---------------------------------------------------------------------------

/// Source of row change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Subscribe to insert/update/delete events on the given kinds.
    async fn subscribe(&self, kinds: &[RecordKind]) -> Result<Subscription, StoreError>;
}

/// A live subscription: an event stream plus the handle that ends it.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    handle: SubscriptionHandle,
}

impl Subscription {
    /// Build a subscription and the shutdown signal its producer watches.
    /// The producer should stop once the receiver reports `true` or the
    /// sender is gone.
    pub fn new(events: mpsc::Receiver<ChangeEvent>) -> (Self, watch::Receiver<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sub = Self {
            events,
            handle: SubscriptionHandle {
                shutdown: Some(shutdown_tx),
            },
        };
        (sub, shutdown_rx)
    }

    pub fn split(self) -> (mpsc::Receiver<ChangeEvent>, SubscriptionHandle) {
        (self.events, self.handle)
    }
}

/// Ends a subscription. Idempotent; dropping the handle also unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    shutdown: Option<watch::Sender<bool>>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
