//! Common types shared across the advisor pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete trading action, ordered from most bearish to most bullish.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    StrongSell,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

impl SignalAction {
    /// Numeric score in {-2..2} used by the weighted vote.
    pub fn score(self) -> i8 {
        match self {
            | SignalAction::StrongSell => -2,
            | SignalAction::Sell => -1,
            | SignalAction::Hold => 0,
            | SignalAction::Buy => 1,
            | SignalAction::StrongBuy => 2,
        }
    }

    /// Map a continuous score back to the nearest action bucket.
    ///
    /// Ties round half away from zero (`0.5` is `Buy`, `-1.5` is `StrongSell`);
    /// scores beyond ±2 saturate. Non-finite scores map to `Hold`.
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() {
            return SignalAction::Hold;
        }
        // f64::round is half-away-from-zero
        match score.round().clamp(-2.0, 2.0) as i8 {
            | -2 => SignalAction::StrongSell,
            | -1 => SignalAction::Sell,
            | 1 => SignalAction::Buy,
            | 2 => SignalAction::StrongBuy,
            | _ => SignalAction::Hold,
        }
    }

    pub fn is_buy_side(self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::StrongBuy)
    }

    pub fn is_sell_side(self) -> bool {
        matches!(self, SignalAction::Sell | SignalAction::StrongSell)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            | SignalAction::StrongSell => "strong_sell",
            | SignalAction::Sell => "sell",
            | SignalAction::Hold => "hold",
            | SignalAction::Buy => "buy",
            | SignalAction::StrongBuy => "strong_buy",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream collaborator that produced a signal.
///
/// Closed set: adding a source forces every weighting table to handle it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Technical,
    Sentiment,
    Institutional,
    GovernmentContract,
    Fundamental,
}

impl SignalSource {
    pub const ALL: [SignalSource; 5] = [
        SignalSource::Technical,
        SignalSource::Sentiment,
        SignalSource::Institutional,
        SignalSource::GovernmentContract,
        SignalSource::Fundamental,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            | SignalSource::Technical => "technical",
            | SignalSource::Sentiment => "sentiment",
            | SignalSource::Institutional => "institutional",
            | SignalSource::GovernmentContract => "government_contract",
            | SignalSource::Fundamental => "fundamental",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker for computations that hit a zero denominator and returned a sentinel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NumericFlag {
    /// Historical returns have zero variance; Sharpe set to 0.
    ZeroVolatility,
    /// No downside deviation; Sortino set to 0.
    ZeroDownsideDeviation,
    /// Average gain of zero with a positive average loss; raw Kelly set to -1.
    ZeroPayoff,
    /// Average loss of zero; raw Kelly falls back to the win rate.
    ZeroLoss,
}

impl NumericFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            | NumericFlag::ZeroVolatility => "zero_volatility",
            | NumericFlag::ZeroDownsideDeviation => "zero_downside_deviation",
            | NumericFlag::ZeroPayoff => "zero_payoff",
            | NumericFlag::ZeroLoss => "zero_loss",
        }
    }
}

impl fmt::Display for NumericFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
