//! Final per-symbol instructions.

pub mod composer;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analysis::EvTier;
use crate::signal::SignalAction;
use crate::utils::error::{Error, Result};

pub use composer::RecommendationComposer;

/// What to do with one symbol this cycle, and how much capital to commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub action: SignalAction,
    /// Share of available capital, never above the cycle's per-position cap
    pub position_fraction: f64,
    pub dollar_amount: f64,
    pub confidence: f64,
    pub rationale: String,
    pub risk_tier: EvTier,
}

impl Recommendation {
    /// Flat JSON object for downstream persistence or presentation layers.
    pub fn to_record(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            | Value::Object(map) => Ok(map),
            | other => Err(Error::Other(format!("recommendation serialized to non-object: {other}"))),
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != SignalAction::Hold && self.position_fraction > 0.0
    }
}
