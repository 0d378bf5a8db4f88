//! Feed synchronizer.
//!
//! Owns the in-memory snapshot of both collections. Every refresh re-reads
//! the newest rows of each kind and replaces the held sequence wholesale;
//! change notifications only ever trigger a refresh, they are never
//! applied as deltas.
//!
//! Each refresh carries a generation number. A collection result is
//! applied only when it is newer than the last result applied to that
//! collection, so a slow read cannot overwrite fresher data. `loading`
//! clears when the most recently issued refresh settles.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::store::{ChangeFeed, RecordStore, StoreError, SubscriptionHandle};
use crate::types::{recent_first, ChangeEvent, FeedSnapshot, RecordKind, Timestamped};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Refresh counters exposed on the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    pub refreshes_completed: u64,
    pub failed_reads: u64,
    /// Results dropped because a newer refresh had already landed.
    pub superseded_results: u64,
    pub notifications_received: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Handle to the shared synchronizer. Clones share one snapshot.
#[derive(Clone)]
pub struct FeedSynchronizer {
    inner: Arc<Inner>,
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct Inner {
    store: Arc<dyn RecordStore>,
    feed: Option<Arc<dyn ChangeFeed>>,
    fetch_limit: usize,
    issued: AtomicU64,
    started: AtomicBool,
    state: RwLock<SyncState>,
    listener: Mutex<Option<Listener>>,
}

#[derive(Default)]
struct SyncState {
    snapshot: FeedSnapshot,
    signals_generation: u64,
    picks_generation: u64,
    stats: SyncStats,
}

struct Listener {
    subscription: SubscriptionHandle,
    stop: oneshot::Sender<()>,
}

enum Applied {
    Replaced,
    Superseded,
    Failed,
}

/// Replace `slot` with a successful read unless a newer one already landed.
fn apply<T: Timestamped>(
    kind: RecordKind,
    slot: &mut Vec<T>,
    applied_generation: &mut u64,
    generation: u64,
    result: Result<Vec<T>, StoreError>,
    limit: usize,
) -> Applied {
    match result {
        Ok(records) if generation > *applied_generation => {
            *slot = recent_first(records, limit);
            *applied_generation = generation;
            Applied::Replaced
        }
        Ok(_) => {
            debug!(%kind, generation, latest = *applied_generation, "Discarding superseded read");
            Applied::Superseded
        }
        Err(e) => {
            warn!(%kind, error = %e, "Read failed, keeping previous snapshot");
            Applied::Failed
        }
    }
}

impl Inner {
    async fn refresh(&self) {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.write().await.snapshot.loading = true;

        let started = Instant::now();
        let (signals, picks) = tokio::join!(
            self.store.recent_signals(self.fetch_limit),
            self.store.recent_picks(self.fetch_limit),
        );

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let outcomes = [
            apply(
                RecordKind::Signals,
                &mut state.snapshot.signals,
                &mut state.signals_generation,
                generation,
                signals,
                self.fetch_limit,
            ),
            apply(
                RecordKind::Picks,
                &mut state.snapshot.picks,
                &mut state.picks_generation,
                generation,
                picks,
                self.fetch_limit,
            ),
        ];

        for outcome in &outcomes {
            match outcome {
                Applied::Failed => state.stats.failed_reads += 1,
                Applied::Superseded => state.stats.superseded_results += 1,
                Applied::Replaced => {}
            }
        }

        if generation == self.issued.load(Ordering::SeqCst) {
            state.snapshot.loading = false;
        }
        state.stats.refreshes_completed += 1;
        state.stats.last_refresh = Some(Utc::now());

        info!(
            generation,
            signals = state.snapshot.signals.len(),
            picks = state.snapshot.picks.len(),
            failed = outcomes.iter().filter(|o| matches!(o, Applied::Failed)).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Refresh complete"
        );
    }
}

/// Drain notifications and refresh once per burst. Holds only a weak
/// reference so a dropped synchronizer ends the loop.
async fn listen(
    inner: Weak<Inner>,
    mut events: mpsc::Receiver<ChangeEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = &mut stop => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    warn!("Change feed closed; live updates stopped");
                    break;
                }
            },
        };

        let mut coalesced = 1u64;
        while events.try_recv().is_ok() {
            coalesced += 1;
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        debug!(kind = %event.kind, change = %event.change, coalesced, "Change notification");
        inner.state.write().await.stats.notifications_received += coalesced;
        inner.refresh().await;
    }
    debug!("Change listener exited");
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

impl FeedSynchronizer {
    /// Create a synchronizer. `feed` is optional: without one the snapshot
    /// only changes on explicit `refresh()` calls.
    pub fn new(
        store: Arc<dyn RecordStore>,
        feed: Option<Arc<dyn ChangeFeed>>,
        fetch_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                feed,
                fetch_limit,
                issued: AtomicU64::new(0),
                started: AtomicBool::new(false),
                state: RwLock::new(SyncState::default()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Re-read both collections and replace them. Never fails: a failed
    /// read leaves that collection as it was.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Subscribe to changes on both kinds, then load the initial snapshot.
    /// A second call while running does nothing.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("Synchronizer already started");
            return;
        }

        match &self.inner.feed {
            Some(feed) => match feed.subscribe(RecordKind::ALL).await {
                Ok(subscription) => {
                    let (events, handle) = subscription.split();
                    let (stop_tx, stop_rx) = oneshot::channel();
                    tokio::spawn(listen(Arc::downgrade(&self.inner), events, stop_rx));
                    *self.inner.listener.lock().await = Some(Listener {
                        subscription: handle,
                        stop: stop_tx,
                    });
                    info!("Subscribed to change notifications");
                }
                Err(e) => {
                    error!(error = %e, "Change subscription failed; serving without live updates");
                }
            },
            None => info!("No change feed configured; refreshing on demand only"),
        }

        self.inner.refresh().await;
    }

    /// Release the change subscription. Safe to call repeatedly and before
    /// `start()`. Refreshes already in flight still complete.
    pub async fn stop(&self) {
        if let Some(mut listener) = self.inner.listener.lock().await.take() {
            listener.subscription.unsubscribe();
            let _ = listener.stop.send(());
            info!("Change subscription released");
        }
        self.inner.started.store(false, Ordering::SeqCst);
    }

    /// Whether a change subscription is currently held.
    pub async fn is_subscribed(&self) -> bool {
        self.inner.listener.lock().await.is_some()
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> FeedSnapshot {
        self.inner.state.read().await.snapshot.clone()
    }

    pub async fn stats(&self) -> SyncStats {
        self.inner.state.read().await.stats.clone()
    }

    pub fn fetch_limit(&self) -> usize {
        self.inner.fetch_limit
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
