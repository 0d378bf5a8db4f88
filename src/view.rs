//! View projector.
//!
//! Pure mapping from a `FeedSnapshot` and the selected tab to the
//! structure the dashboard page renders. No I/O, no mutation: the same
//! input always yields the same `View`.

use serde::Serialize;

use crate::types::{FeedSnapshot, SoccerPick, Tab, TradingSignal};

/// Records shown per tab. The snapshot may hold more.
pub const DISPLAY_LIMIT: usize = 5;

pub const LOADING_MESSAGE: &str = "Loading data...";
pub const NO_SIGNALS_MESSAGE: &str = "No signals yet. Waiting for market open...";
pub const NO_PICKS_MESSAGE: &str = "No picks yet. Analysis runs before match day...";

/// Consensus models shown in the health panel. Decorative only.
pub const MODEL_ROSTER: &[&str] = &[
    "DeepSeek V3.2",
    "Kimi K2.5",
    "Qwen3 235B",
    "GLM-4.7",
    "MiniMax M2.1",
    "ERNIE-4.5",
    "Llama 4",
    "DeepSeek Prover",
];

const QUALITY_BADGES: &[(&str, &str)] = &[
    ("FIRE", "🔥 FIRE"),
    ("STRONG", "⚡ STRONG"),
    ("GOOD", "✅ GOOD"),
    ("WEAK", "⚠️ WEAK"),
];

/// Aggregate stats have no backing computation yet.
const STAT_PLACEHOLDER: &str = "--";
const STAT_LABELS: &[&str] = &["Win Rate", "Total Picks", "ROI"];

// ---------------------------------------------------------------------------
// View model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

/// A styled label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub label: String,
    pub tone: Tone,
}

impl Badge {
    fn new(label: impl Into<String>, tone: Tone) -> Self {
        Self {
            label: label.into(),
            tone,
        }
    }
}

/// Either a list of cards or the tab's placeholder message. Never an
/// empty list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Section<T> {
    Empty { message: String },
    Items { items: Vec<T> },
}

impl<T> Section<T> {
    pub fn items(&self) -> &[T] {
        match self {
            Section::Items { items } => items,
            Section::Empty { .. } => &[],
        }
    }

    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Section::Empty { message } => Some(message.as_str()),
            Section::Items { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalCard {
    pub id: String,
    pub symbol: String,
    pub direction: Badge,
    pub session: String,
    pub levels: String,
    pub quality: String,
    pub consensus: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickCard {
    pub id: String,
    pub fixture: String,
    pub league: String,
    pub prediction: Badge,
    pub confidence: String,
    pub consensus: String,
    /// Omitted until the pick settles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Badge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelHealth {
    pub name: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatTile {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuturesView {
    pub title: String,
    pub signals: Section<SignalCard>,
    pub model_health: Vec<ModelHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoccerView {
    pub title: String,
    pub picks: Section<PickCard>,
    pub performance: Vec<StatTile>,
}

/// Everything the page needs for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    Loading { message: String },
    Futures(FuturesView),
    Soccer(SoccerView),
}

// ---------------------------------------------------------------------------
// Badge lookups
// ---------------------------------------------------------------------------

/// Quality label from the static table; unknown values pass through.
pub fn quality_badge(quality: &str) -> String {
    QUALITY_BADGES
        .iter()
        .find(|(raw, _)| *raw == quality)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| quality.to_string())
}

pub fn direction_badge(direction: &str) -> Badge {
    let tone = match direction {
        "LONG" => Tone::Positive,
        "SHORT" => Tone::Negative,
        _ => Tone::Neutral,
    };
    Badge::new(direction, tone)
}

pub fn prediction_badge(prediction: &str, line: impl std::fmt::Display) -> Badge {
    let tone = match prediction {
        "OVER" => Tone::Positive,
        "UNDER" => Tone::Negative,
        _ => Tone::Neutral,
    };
    Badge::new(format!("{prediction} {line}"), tone)
}

pub fn result_badge(result: &str) -> Badge {
    let tone = match result {
        "WIN" => Tone::Positive,
        "LOSS" => Tone::Negative,
        _ => Tone::Neutral,
    };
    Badge::new(result, tone)
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

fn signal_card(signal: &TradingSignal) -> SignalCard {
    SignalCard {
        id: signal.id.clone(),
        symbol: signal.symbol.clone(),
        direction: direction_badge(&signal.direction),
        session: signal.session.clone(),
        levels: format!(
            "Entry: {} | TP: {} | SL: {}",
            signal.entry, signal.take_profit, signal.stop_loss
        ),
        quality: quality_badge(&signal.quality),
        consensus: signal.consensus.clone(),
    }
}

fn pick_card(pick: &SoccerPick) -> PickCard {
    PickCard {
        id: pick.id.clone(),
        fixture: pick.fixture.clone(),
        league: pick.league.clone(),
        prediction: prediction_badge(&pick.prediction, pick.line),
        confidence: format!("{}%", pick.confidence),
        consensus: pick.consensus.clone(),
        result: pick.result.as_deref().map(result_badge),
    }
}

fn section<R, T>(records: &[R], empty_message: &str, card: fn(&R) -> T) -> Section<T> {
    if records.is_empty() {
        return Section::Empty {
            message: empty_message.to_string(),
        };
    }
    Section::Items {
        items: records.iter().take(DISPLAY_LIMIT).map(card).collect(),
    }
}

/// Project the snapshot for the selected tab.
pub fn project(snapshot: &FeedSnapshot, tab: Tab) -> View {
    if snapshot.loading {
        return View::Loading {
            message: LOADING_MESSAGE.to_string(),
        };
    }

    match tab {
        Tab::Futures => View::Futures(FuturesView {
            title: "📊 Latest Signals".to_string(),
            signals: section(&snapshot.signals, NO_SIGNALS_MESSAGE, signal_card),
            model_health: MODEL_ROSTER
                .iter()
                .map(|name| ModelHealth {
                    name: (*name).to_string(),
                    online: true,
                })
                .collect(),
        }),
        Tab::Soccer => View::Soccer(SoccerView {
            title: "⚽ Today's O/U Picks".to_string(),
            picks: section(&snapshot.picks, NO_PICKS_MESSAGE, pick_card),
            performance: STAT_LABELS
                .iter()
                .map(|label| StatTile {
                    label: (*label).to_string(),
                    value: STAT_PLACEHOLDER.to_string(),
                })
                .collect(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
