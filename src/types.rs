//! Shared types for the dashboard.
//!
//! Records are immutable once read: the synchronizer replaces whole
//! collections and never edits a record in place.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A futures trading signal produced by the consensus models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub symbol: String,
    /// "LONG" | "SHORT". Other values are kept and rendered unstyled.
    #[serde(default, deserialize_with = "nullable_string")]
    pub direction: String,
    pub entry: Decimal,
    #[serde(rename = "tp")]
    pub take_profit: Decimal,
    #[serde(rename = "sl")]
    pub stop_loss: Decimal,
    /// "FIRE" | "STRONG" | "GOOD" | "WEAK", open-ended.
    #[serde(default, deserialize_with = "nullable_string")]
    pub quality: String,
    /// Agreement across evaluating models, e.g. "7/8".
    #[serde(default, deserialize_with = "nullable_string")]
    pub consensus: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub session: String,
    pub created_at: DateTime<Utc>,
}

/// A soccer over/under pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoccerPick {
    pub id: String,
    #[serde(rename = "match")]
    pub fixture: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub league: String,
    /// "OVER" | "UNDER".
    #[serde(default, deserialize_with = "nullable_string")]
    pub prediction: String,
    pub line: Decimal,
    /// Percentage, 0–100.
    pub confidence: f64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub consensus: String,
    /// "WIN" | "LOSS" once settled; absent before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Records ordered by `created_at`.
pub trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
}

impl Timestamped for TradingSignal {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Timestamped for SoccerPick {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Sort most-recent first and keep at most `limit` records.
/// Stable, so rows sharing a timestamp keep the store's order.
pub fn recent_first<T: Timestamped>(mut records: Vec<T>, limit: usize) -> Vec<T> {
    records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    records.truncate(limit);
    records
}

/// Treat JSON `null` the same as a missing text column.
fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Record kinds and change notifications
// ---------------------------------------------------------------------------

/// The two synchronized collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Signals,
    Picks,
}

impl RecordKind {
    pub const ALL: &'static [RecordKind] = &[RecordKind::Signals, RecordKind::Picks];

    /// Realtime channel name for this kind.
    pub fn channel(&self) -> &'static str {
        match self {
            RecordKind::Signals => "signals",
            RecordKind::Picks => "picks",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel())
    }
}

/// What happened to a row, as reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Synthesised after a reconnect: changes may have been missed.
    Resync,
}

impl ChangeKind {
    /// Parse the store's `INSERT` / `UPDATE` / `DELETE` tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
            ChangeKind::Resync => write!(f, "RESYNC"),
        }
    }
}

/// A change notification. Carries no row data; receivers re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: RecordKind,
    pub change: ChangeKind,
}

impl ChangeEvent {
    pub fn new(kind: RecordKind, change: ChangeKind) -> Self {
        Self { kind, change }
    }
}

// ---------------------------------------------------------------------------
// Tabs and snapshot
// ---------------------------------------------------------------------------

/// Which collection the dashboard is showing. Owned by the presentation layer.
/// Deserialises through `FromStr`, so any casing is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Futures,
    Soccer,
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tab::Futures => write!(f, "futures"),
            Tab::Soccer => write!(f, "soccer"),
        }
    }
}

impl std::str::FromStr for Tab {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "futures" => Ok(Tab::Futures),
            "soccer" => Ok(Tab::Soccer),
            _ => Err(DashboardError::UnknownTab(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Tab {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The latest known state of both collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub signals: Vec<TradingSignal>,
    pub picks: Vec<SoccerPick>,
    pub loading: bool,
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self {
            signals: Vec::new(),
            picks: Vec::new(),
            loading: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors outside the store layer.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Unknown tab: {0} (expected 'futures' or 'soccer')")]
    UnknownTab(String),
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

#[cfg(test)]
impl TradingSignal {
    /// A LONG signal created `minutes_ago` before a fixed reference time.
    pub fn sample(id: &str, quality: &str, minutes_ago: i64) -> Self {
        use rust_decimal_macros::dec;
        TradingSignal {
            id: id.to_string(),
            symbol: "ES".to_string(),
            direction: "LONG".to_string(),
            entry: dec!(5021.25),
            take_profit: dec!(5040.00),
            stop_loss: dec!(5010.50),
            quality: quality.to_string(),
            consensus: "7/8".to_string(),
            session: "NY Open".to_string(),
            created_at: reference_time() - chrono::Duration::minutes(minutes_ago),
        }
    }
}

#[cfg(test)]
impl SoccerPick {
    /// An unsettled OVER 2.5 pick created `minutes_ago` before a fixed reference time.
    pub fn sample(id: &str, minutes_ago: i64) -> Self {
        use rust_decimal_macros::dec;
        SoccerPick {
            id: id.to_string(),
            fixture: "Arsenal vs Chelsea".to_string(),
            league: "Premier League".to_string(),
            prediction: "OVER".to_string(),
            line: dec!(2.5),
            confidence: 72.0,
            consensus: "6/8".to_string(),
            result: None,
            created_at: reference_time() - chrono::Duration::minutes(minutes_ago),
        }
    }
}

#[cfg(test)]
pub fn reference_time() -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(2026, 2, 21, 14, 30, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
