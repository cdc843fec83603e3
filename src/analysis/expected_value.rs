//! Multi-scenario expected value and tail-risk metrics.
//!
//! `evaluate` combines two views of a symbol: an explicit scenario set
//! (probability-weighted EV, scenario dispersion, probability of loss) and the
//! symbol's historical return series (VaR/CVaR, Sharpe, Sortino). The tier is
//! a fixed threshold ladder over the risk-adjusted EV and probability of loss.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ExpectedValueConfig, ScenarioWeights};
use crate::utils::error::{Error, Result};
use crate::utils::stats;
use crate::utils::types::NumericFlag;

/// Tolerance on Σprobability for a scenario set.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Historical return series and its win/loss summary for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnDistribution {
    pub symbol: String,
    /// Sampling period of the returns, e.g. "1d"
    pub period: String,
    pub historical_returns: Vec<f64>,
    /// Fraction of strictly positive periods
    pub win_rate: f64,
    /// Mean of the positive returns
    pub avg_gain: f64,
    /// Mean magnitude of the negative returns (stored positive)
    pub avg_loss: f64,
}

impl ReturnDistribution {
    /// Build a distribution and derive win rate and average gain/loss from the returns.
    pub fn from_returns(symbol: impl Into<String>, period: impl Into<String>, returns: Vec<f64>) -> Self {
        let gains: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).map(f64::abs).collect();
        let win_rate = if returns.is_empty() { 0.0 } else { gains.len() as f64 / returns.len() as f64 };
        Self {
            symbol: symbol.into(),
            period: period.into(),
            win_rate,
            avg_gain: stats::mean(&gains),
            avg_loss: stats::mean(&losses),
            historical_returns: returns,
        }
    }

    /// Reject malformed summaries before any scoring happens.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.win_rate) {
            return Err(Error::InvalidProbability {
                symbol: self.symbol.clone(),
                field: "win_rate".to_string(),
                value: self.win_rate,
            });
        }
        if !self.avg_gain.is_finite() || self.avg_gain < 0.0 || !self.avg_loss.is_finite() || self.avg_loss < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "{}: avg_gain/avg_loss must be finite and >= 0 (got {}, {})",
                self.symbol, self.avg_gain, self.avg_loss
            )));
        }
        if self.historical_returns.iter().any(|r| !r.is_finite()) {
            return Err(Error::InvalidArgument(format!("{}: non-finite historical return", self.symbol)));
        }
        Ok(())
    }
}

/// One named outcome with its probability and expected return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub probability: f64,
    pub expected_return: f64,
}

impl Scenario {
    pub fn new(name: impl Into<String>, probability: f64, expected_return: f64) -> Self {
        Self { name: name.into(), probability, expected_return }
    }
}

/// Ordered, validated scenario list whose probabilities sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Scenario>", into = "Vec<Scenario>")]
pub struct ScenarioSet {
    scenarios: Vec<Scenario>,
}

impl ScenarioSet {
    /// Validate and wrap a scenario list. Probabilities are never re-normalised.
    pub fn new(scenarios: Vec<Scenario>) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(Error::InvalidArgument("scenario set is empty".to_string()));
        }
        for s in &scenarios {
            if !(0.0..=1.0).contains(&s.probability) {
                return Err(Error::InvalidProbability {
                    symbol: String::new(),
                    field: format!("scenario {}", s.name),
                    value: s.probability,
                });
            }
            if !s.expected_return.is_finite() {
                return Err(Error::InvalidArgument(format!("scenario {} has a non-finite return", s.name)));
            }
        }
        let total: f64 = scenarios.iter().map(|s| s.probability).sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(Error::InvalidProbability {
                symbol: String::new(),
                field: "scenario probability sum".to_string(),
                value: total,
            });
        }
        Ok(Self { scenarios })
    }

    /// Canonical bull/base/bear/crash/melt-up set derived from a return history.
    ///
    /// bull = average gain, base = mean return, bear = -average loss,
    /// crash = mean of the lower 5% tail, melt-up = mean of the upper 5% tail.
    pub fn canonical(distribution: &ReturnDistribution, weights: &ScenarioWeights) -> Result<Self> {
        let returns = &distribution.historical_returns;
        let lower = stats::percentile(returns, 0.05);
        let upper = stats::percentile(returns, 0.95);
        let crash: Vec<f64> = returns.iter().copied().filter(|r| *r <= lower).collect();
        let melt_up: Vec<f64> = returns.iter().copied().filter(|r| *r >= upper).collect();
        Self::new(vec![
            Scenario::new("bull", weights.bull, distribution.avg_gain),
            Scenario::new("base", weights.base, stats::mean(returns)),
            Scenario::new("bear", weights.bear, -distribution.avg_loss),
            Scenario::new("crash", weights.crash, stats::mean(&crash)),
            Scenario::new("melt_up", weights.melt_up, stats::mean(&melt_up)),
        ])
        .map_err(|e| match e {
            | Error::InvalidProbability { field, value, .. } => Error::InvalidProbability {
                symbol: distribution.symbol.clone(),
                field,
                value,
            },
            | other => other,
        })
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl TryFrom<Vec<Scenario>> for ScenarioSet {
    type Error = Error;

    fn try_from(value: Vec<Scenario>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ScenarioSet> for Vec<Scenario> {
    fn from(value: ScenarioSet) -> Self {
        value.scenarios
    }
}

/// Quality/risk classification of an opportunity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EvTier {
    Premium,
    Strong,
    Moderate,
    Speculative,
    Avoid,
}

impl EvTier {
    /// Threshold ladder; the first rung whose EV floor and loss ceiling both hold wins.
    pub fn classify(risk_adjusted_ev: f64, probability_of_loss: f64) -> Self {
        const LADDER: [(EvTier, f64, f64); 4] = [
            (EvTier::Premium, 0.15, 0.25),
            (EvTier::Strong, 0.08, 0.35),
            (EvTier::Moderate, 0.03, 0.50),
            (EvTier::Speculative, 0.0, 0.65),
        ];
        LADDER
            .iter()
            .find(|(_, min_ev, max_loss)| risk_adjusted_ev >= *min_ev && probability_of_loss <= *max_loss)
            .map(|(tier, _, _)| *tier)
            .unwrap_or(EvTier::Avoid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            | EvTier::Premium => "premium",
            | EvTier::Strong => "strong",
            | EvTier::Moderate => "moderate",
            | EvTier::Speculative => "speculative",
            | EvTier::Avoid => "avoid",
        }
    }
}

impl fmt::Display for EvTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected value and risk bundle for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvResult {
    pub symbol: String,
    pub expected_value: f64,
    pub risk_adjusted_ev: f64,
    pub probability_of_loss: f64,
    /// 5th percentile of historical returns (negative = loss)
    pub var_95: f64,
    /// Mean of the returns at or below `var_95`
    pub cvar_95: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub tier: EvTier,
    /// Zero-denominator cases that were replaced by a sentinel
    pub numeric_flags: Vec<NumericFlag>,
}

/// Expected value calculator
#[derive(Debug, Clone, Default)]
pub struct ExpectedValueCalculator {
    config: ExpectedValueConfig,
}

/// Evaluate with the default configuration (λ = 1, 252 periods per year).
pub fn evaluate(distribution: &ReturnDistribution, scenarios: &ScenarioSet) -> Result<EvResult> {
    ExpectedValueCalculator::default().evaluate(distribution, scenarios)
}

fn ensure_finite(symbol: &str, name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NumericDegenerate { symbol: symbol.to_string(), detail: format!("{name} is {value}") })
    }
}

impl ExpectedValueCalculator {
    pub fn new(config: ExpectedValueConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExpectedValueConfig {
        &self.config
    }

    /// Canonical scenario set for `distribution` using the configured weights.
    pub fn canonical_scenarios(&self, distribution: &ReturnDistribution) -> Result<ScenarioSet> {
        ScenarioSet::canonical(distribution, &self.config.scenario_weights)
    }

    /// Score a symbol across `scenarios` and its historical returns.
    pub fn evaluate(&self, distribution: &ReturnDistribution, scenarios: &ScenarioSet) -> Result<EvResult> {
        distribution.validate()?;
        let symbol = distribution.symbol.as_str();
        let returns = &distribution.historical_returns;
        if returns.len() < self.config.min_observations {
            return Err(Error::InsufficientHistory {
                symbol: symbol.to_string(),
                observed: returns.len(),
                required: self.config.min_observations,
            });
        }

        let expected_value: f64 = scenarios.iter().map(|s| s.probability * s.expected_return).sum();
        let scenario_variance: f64 = scenarios
            .iter()
            .map(|s| s.probability * (s.expected_return - expected_value).powi(2))
            .sum();
        let risk_adjusted_ev = expected_value - self.config.risk_aversion * scenario_variance.sqrt();
        let probability_of_loss: f64 = scenarios
            .iter()
            .filter(|s| s.expected_return < 0.0)
            .map(|s| s.probability)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        let var_95 = stats::percentile(returns, 0.05);
        let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= var_95).collect();
        let cvar_95 = stats::mean(&tail);

        let mut numeric_flags = Vec::new();
        let annualize = self.config.annualization_factor.sqrt();
        let mean = stats::mean(returns);
        let sharpe = match stats::guarded_ratio(mean, stats::population_std_dev(returns)) {
            | Some(r) => r * annualize,
            | None => {
                numeric_flags.push(NumericFlag::ZeroVolatility);
                0.0
            }
        };
        let sortino = match stats::guarded_ratio(mean, stats::downside_deviation(returns)) {
            | Some(r) => r * annualize,
            | None => {
                numeric_flags.push(NumericFlag::ZeroDownsideDeviation);
                0.0
            }
        };

        let tier = EvTier::classify(risk_adjusted_ev, probability_of_loss);
        let result = EvResult {
            symbol: symbol.to_string(),
            expected_value: ensure_finite(symbol, "expected_value", expected_value)?,
            risk_adjusted_ev: ensure_finite(symbol, "risk_adjusted_ev", risk_adjusted_ev)?,
            probability_of_loss,
            var_95: ensure_finite(symbol, "var_95", var_95)?,
            cvar_95: ensure_finite(symbol, "cvar_95", cvar_95)?,
            sharpe: ensure_finite(symbol, "sharpe", sharpe)?,
            sortino: ensure_finite(symbol, "sortino", sortino)?,
            tier,
            numeric_flags,
        };
        debug!(
            "EV {}: ev={:.5} rae={:.5} p_loss={:.3} var95={:.5} cvar95={:.5} sharpe={:.3} sortino={:.3} tier={}",
            symbol,
            result.expected_value,
            result.risk_adjusted_ev,
            result.probability_of_loss,
            result.var_95,
            result.cvar_95,
            result.sharpe,
            result.sortino,
            result.tier
        );
        Ok(result)
    }
}
