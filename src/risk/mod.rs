//! Position sizing and performance-adaptive risk limits.
//!
//! The Kelly optimizer is pure; the dynamic risk manager is the only stateful
//! component in the crate and sits behind [`RiskGovernor`] so it can be swapped
//! for a synthetic-history double in tests or backtests.

pub mod dynamic;
pub mod position_sizer;
pub mod shared;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use dynamic::{DynamicRiskManager, PerformanceWindow, StreakType, TradeOutcome};
pub use position_sizer::{raw_kelly_fraction, Allocation, KellyOptimizer, KellyResult};
pub use shared::SharedRiskManager;

/// Risk posture derived from recent trading performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskState {
    Normal,
    Cautious,
    Cooldown,
}

impl RiskState {
    pub fn as_str(self) -> &'static str {
        match self {
            | RiskState::Normal => "normal",
            | RiskState::Cautious => "cautious",
            | RiskState::Cooldown => "cooldown",
        }
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caps in force for one cycle. Always rebuilt whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub state: RiskState,
    pub max_position_fraction: f64,
    pub max_portfolio_risk_fraction: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl RiskLimits {
    /// Limits with no performance adjustment applied.
    pub fn normal(max_position_fraction: f64, max_portfolio_risk_fraction: f64) -> Self {
        Self {
            state: RiskState::Normal,
            max_position_fraction,
            max_portfolio_risk_fraction,
            cooldown_until: None,
        }
    }

    /// Both caps zeroed until `until`.
    pub fn cooldown(until: DateTime<Utc>) -> Self {
        Self {
            state: RiskState::Cooldown,
            max_position_fraction: 0.0,
            max_portfolio_risk_fraction: 0.0,
            cooldown_until: Some(until),
        }
    }

    pub fn is_cooldown(&self) -> bool {
        self.state == RiskState::Cooldown
    }
}

/// Owner of the cross-cycle performance window.
pub trait RiskGovernor: Send + Sync + fmt::Debug {
    /// Append a closed trade and return the limits in force right after it.
    fn record_outcome(&mut self, trade: TradeOutcome) -> RiskLimits;

    /// Limits in force at `now`; leaves Cooldown once it has expired.
    fn limits_at(&mut self, now: DateTime<Utc>) -> RiskLimits;

    /// Read-only view of the trailing trades.
    fn window(&self) -> &PerformanceWindow;

    /// Clone boxed trait-objects safely.
    fn box_clone(&self) -> Box<dyn RiskGovernor>;
}

impl Clone for Box<dyn RiskGovernor> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
