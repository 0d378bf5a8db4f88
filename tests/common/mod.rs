//! In-memory store and change feed for integration testing.
//!
//! Deterministic `RecordStore` / `ChangeFeed` implementations whose data,
//! failures, and latency are fully controllable from test code.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use opus_dashboard::store::{ChangeFeed, RecordStore, StoreError, Subscription};
use opus_dashboard::types::{ChangeEvent, RecordKind, SoccerPick, TradingSignal};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
}

pub fn signal(id: &str, quality: &str, minute: i64) -> TradingSignal {
    TradingSignal {
        id: id.to_string(),
        symbol: "NQ".to_string(),
        direction: "SHORT".to_string(),
        entry: dec!(18250.75),
        take_profit: dec!(18190),
        stop_loss: dec!(18280.5),
        quality: quality.to_string(),
        consensus: "6/8".to_string(),
        session: "NY Open".to_string(),
        created_at: t0() + ChronoDuration::minutes(minute),
    }
}

pub fn pick(id: &str, minute: i64) -> SoccerPick {
    SoccerPick {
        id: id.to_string(),
        fixture: "Ajax vs PSV".to_string(),
        league: "Eredivisie".to_string(),
        prediction: "UNDER".to_string(),
        line: dec!(3.5),
        confidence: 66.0,
        consensus: "5/8".to_string(),
        result: None,
        created_at: t0() + ChronoDuration::minutes(minute),
    }
}

/// A mock store holding rows in memory.
///
/// Reads capture the current rows at call time, then wait out any
/// scripted delay before returning, like a slow network round-trip.
#[derive(Default)]
pub struct MemoryStore {
    signals: Mutex<Vec<TradingSignal>>,
    picks: Mutex<Vec<SoccerPick>>,
    fail_signals: AtomicBool,
    fail_picks: AtomicBool,
    signal_delays: Mutex<VecDeque<Duration>>,
    signal_reads: AtomicUsize,
    pick_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_signals(&self, rows: Vec<TradingSignal>) {
        *self.signals.lock().unwrap() = rows;
    }

    pub fn set_picks(&self, rows: Vec<SoccerPick>) {
        *self.picks.lock().unwrap() = rows;
    }

    pub fn fail_signals(&self, fail: bool) {
        self.fail_signals.store(fail, Ordering::SeqCst);
    }

    pub fn fail_picks(&self, fail: bool) {
        self.fail_picks.store(fail, Ordering::SeqCst);
    }

    /// Delay the next signals read by `delay`.
    pub fn delay_next_signals_read(&self, delay: Duration) {
        self.signal_delays.lock().unwrap().push_back(delay);
    }

    pub fn signal_reads(&self) -> usize {
        self.signal_reads.load(Ordering::SeqCst)
    }

    pub fn pick_reads(&self) -> usize {
        self.pick_reads.load(Ordering::SeqCst)
    }

    fn newest<T: Clone>(rows: &[T], limit: usize, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
        let mut rows = rows.to_vec();
        rows.sort_by(|a, b| key(b).cmp(&key(a)));
        rows.truncate(limit);
        rows
    }
}

fn outage(table: &str) -> StoreError {
    StoreError::Status {
        table: table.to_string(),
        status: 503,
        body: "service unavailable".to_string(),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn recent_signals(&self, limit: usize) -> Result<Vec<TradingSignal>, StoreError> {
        self.signal_reads.fetch_add(1, Ordering::SeqCst);
        let failing = self.fail_signals.load(Ordering::SeqCst);
        let rows = Self::newest(&self.signals.lock().unwrap(), limit, |s| s.created_at);
        let delay = self.signal_delays.lock().unwrap().pop_front();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(outage("session_analysis"));
        }
        Ok(rows)
    }

    async fn recent_picks(&self, limit: usize) -> Result<Vec<SoccerPick>, StoreError> {
        self.pick_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_picks.load(Ordering::SeqCst) {
            return Err(outage("model_predictions"));
        }
        Ok(Self::newest(&self.picks.lock().unwrap(), limit, |p| p.created_at))
    }
}

/// A change feed driven by test code through an mpsc sender.
pub struct ChannelFeed {
    events: Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
    shutdown: Mutex<Option<watch::Receiver<bool>>>,
    subscribed_kinds: Mutex<Vec<RecordKind>>,
}

impl ChannelFeed {
    pub fn new() -> (Self, mpsc::Sender<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(32);
        let feed = Self {
            events: Mutex::new(Some(rx)),
            shutdown: Mutex::new(None),
            subscribed_kinds: Mutex::new(Vec::new()),
        };
        (feed, tx)
    }

    /// Whether the subscriber has released its subscription.
    pub fn released(&self) -> bool {
        self.shutdown
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    pub fn subscribed_kinds(&self) -> Vec<RecordKind> {
        self.subscribed_kinds.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeFeed for ChannelFeed {
    async fn subscribe(&self, kinds: &[RecordKind]) -> Result<Subscription, StoreError> {
        let rx = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| StoreError::Realtime("feed already consumed".into()))?;
        *self.subscribed_kinds.lock().unwrap() = kinds.to_vec();
        let (subscription, shutdown) = Subscription::new(rx);
        *self.shutdown.lock().unwrap() = Some(shutdown);
        Ok(subscription)
    }
}

/// Re-check `$cond` every few milliseconds for up to two seconds.
/// `$cond` may contain `.await`.
macro_rules! eventually {
    ($cond:expr) => {{
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while !($cond) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not met within 2s: {}",
                stringify!($cond)
            );
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }};
}
