//! Per-symbol signals from upstream collaborators and their aggregation.

pub mod aggregator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::utils::types::{SignalAction, SignalSource};
pub use aggregator::{aggregate, SignalAggregator};

/// One source's opinion about one symbol for the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSignal {
    pub symbol: String,
    pub source: SignalSource,
    pub action: SignalAction,
    /// Source-reported confidence in [0, 1]
    pub confidence: f64,
    /// Relative vote weight, must be > 0
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
}

impl SymbolSignal {
    pub fn new(
        symbol: impl Into<String>,
        source: SignalSource,
        action: SignalAction,
        confidence: f64,
        weight: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self { symbol: symbol.into(), source, action, confidence, weight, timestamp }
    }
}

/// Weighted-vote result for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignal {
    pub symbol: String,
    pub action: SignalAction,
    /// Continuous weighted score in [-2, 2] before bucketing
    pub score: f64,
    /// Weighted average confidence, clipped to [0, 1]
    pub confidence: f64,
    /// Inputs in canonical (sorted) order
    pub contributing_signals: Vec<SymbolSignal>,
    pub rationale: String,
}
