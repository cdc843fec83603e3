//! One recommendation cycle over many symbols.
//!
//! Symbols are scored independently on the rayon pool. Once every symbol is
//! done, buy-side positions go through a single portfolio pass that fits them
//! inside the correlation caps and the cycle's portfolio risk budget.

use std::collections::BTreeMap;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::{ExpectedValueCalculator, ReturnDistribution, ScenarioSet};
use crate::config::AdvisorConfig;
use crate::recommendation::{Recommendation, RecommendationComposer};
use crate::risk::{Allocation, KellyOptimizer, KellyResult, RiskLimits};
use crate::signal::{SignalAggregator, SymbolSignal};
use crate::utils::error::{Error, Result};

/// Everything the engine needs to score one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInput {
    pub symbol: String,
    pub signals: Vec<SymbolSignal>,
    pub distribution: ReturnDistribution,
    /// Explicit scenarios; the canonical set is derived from the distribution when absent
    pub scenarios: Option<ScenarioSet>,
}

impl SymbolInput {
    pub fn new(symbol: impl Into<String>, signals: Vec<SymbolSignal>, distribution: ReturnDistribution) -> Self {
        Self { symbol: symbol.into(), signals, distribution, scenarios: None }
    }

    pub fn with_scenarios(mut self, scenarios: ScenarioSet) -> Self {
        self.scenarios = Some(scenarios);
        self
    }
}

/// A symbol that produced no recommendation this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    /// Stable error category, e.g. `invalid_weight`
    pub kind: String,
    pub message: String,
}

/// Output of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Sorted by symbol
    pub recommendations: Vec<Recommendation>,
    /// Sorted by symbol
    pub failures: Vec<SymbolFailure>,
    /// Portfolio pass result for buy-side positions, largest first
    pub allocations: Vec<Allocation>,
    /// Limits the cycle ran under
    pub risk_limits: RiskLimits,
}

impl CycleReport {
    pub fn recommendation(&self, symbol: &str) -> Option<&Recommendation> {
        self.recommendations.iter().find(|r| r.symbol == symbol)
    }

    /// Sum of buy-side position fractions.
    pub fn total_buy_fraction(&self) -> f64 {
        self.recommendations.iter().filter(|r| r.action.is_buy_side()).map(|r| r.position_fraction).sum()
    }
}

#[derive(Debug, Clone)]
pub struct AdvisorEngine {
    config: AdvisorConfig,
    aggregator: SignalAggregator,
    calculator: ExpectedValueCalculator,
    optimizer: KellyOptimizer,
    composer: RecommendationComposer,
}

impl Default for AdvisorEngine {
    fn default() -> Self {
        Self::new(AdvisorConfig::default())
    }
}

impl AdvisorEngine {
    pub fn new(config: AdvisorConfig) -> Self {
        Self {
            aggregator: SignalAggregator::new(config.aggregator.source_weights),
            calculator: ExpectedValueCalculator::new(config.expected_value.clone()),
            optimizer: KellyOptimizer::new(config.kelly.clone()),
            composer: RecommendationComposer::new(config.composer.clone()),
            config,
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Aggregate, score, size and compose a single symbol.
    ///
    /// `InsufficientHistory` degrades to a zero-confidence hold; every other
    /// error is returned to the caller.
    pub fn evaluate_symbol(&self, input: &SymbolInput, limits: &RiskLimits) -> Result<Recommendation> {
        let symbol = input.symbol.as_str();
        if input.signals.is_empty() {
            return Err(Error::NoSignals(symbol.to_string()));
        }
        if input.distribution.symbol != symbol {
            return Err(Error::SymbolMismatch {
                expected: symbol.to_string(),
                found: input.distribution.symbol.clone(),
            });
        }
        let aggregated = self.aggregator.aggregate(&input.signals)?;
        if aggregated.symbol != symbol {
            return Err(Error::SymbolMismatch { expected: symbol.to_string(), found: aggregated.symbol });
        }

        let dist = &input.distribution;
        let scenarios = match &input.scenarios {
            | Some(s) => s.clone(),
            | None => self.calculator.canonical_scenarios(dist)?,
        };
        let ev = match self.calculator.evaluate(dist, &scenarios) {
            | Ok(ev) => ev,
            | Err(e @ Error::InsufficientHistory { .. }) => {
                warn!("{}: {}, degrading to hold", symbol, e);
                return Ok(self.composer.insufficient_history(symbol, &e.to_string()));
            }
            | Err(e) => return Err(e),
        };
        let kelly = self.optimizer.optimize_default(symbol, dist.win_rate, dist.avg_gain, dist.avg_loss)?;
        Ok(self.composer.compose(&aggregated, &ev, &kelly, limits))
    }

    /// Run one full cycle under `limits`.
    ///
    /// A symbol supplied by more than one input is rejected for every one of
    /// those inputs, since the portfolio pass allocates per symbol.
    pub fn run_cycle(&self, inputs: Vec<SymbolInput>, limits: &RiskLimits) -> CycleReport {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for input in &inputs {
            *counts.entry(input.symbol.as_str()).or_default() += 1;
        }
        let results: Vec<(String, Result<Recommendation>)> = inputs
            .par_iter()
            .map(|input| {
                let res = match counts.get(input.symbol.as_str()) {
                    | Some(&count) if count > 1 => {
                        Err(Error::DuplicateSymbol { symbol: input.symbol.clone(), count })
                    }
                    | _ => self.evaluate_symbol(input, limits),
                };
                (input.symbol.clone(), res)
            })
            .collect();

        let mut recommendations = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (symbol, res) in results {
            match res {
                | Ok(rec) => recommendations.push(rec),
                | Err(e) => {
                    warn!("Symbol {} failed: {}", symbol, e);
                    failures.push(SymbolFailure { symbol, kind: e.kind().to_string(), message: e.to_string() });
                }
            }
        }

        let (mut recommendations, allocations) = self.allocate(recommendations, limits);
        recommendations.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        info!(
            "Cycle done: {} recommendation(s), {} failure(s), state={}, buy exposure {:.4}",
            recommendations.len(),
            failures.len(),
            limits.state,
            recommendations.iter().filter(|r| r.action.is_buy_side()).map(|r| r.position_fraction).sum::<f64>()
        );
        CycleReport { recommendations, failures, allocations, risk_limits: limits.clone() }
    }

    /// Portfolio pass over buy-side positions. Fractions only ever go down.
    fn allocate(&self, recommendations: Vec<Recommendation>, limits: &RiskLimits) -> (Vec<Recommendation>, Vec<Allocation>) {
        let requests: Vec<KellyResult> = recommendations
            .iter()
            .filter(|r| r.action.is_buy_side() && r.position_fraction > 0.0)
            .map(|r| KellyResult {
                symbol: r.symbol.clone(),
                raw_kelly_fraction: r.position_fraction,
                conservative_fraction: r.position_fraction,
                multiplier_used: self.config.kelly.multiplier,
                numeric_flag: None,
            })
            .collect();
        if requests.is_empty() {
            return (recommendations, Vec::new());
        }

        let budget = self.config.risk.max_portfolio_risk_fraction.min(limits.max_portfolio_risk_fraction);
        let allocations =
            self.optimizer.optimize_portfolio(&requests, &self.config.portfolio.correlation_caps, budget);

        let recommendations = recommendations
            .into_iter()
            .map(|rec| match allocations.iter().find(|a| a.symbol == rec.symbol) {
                | Some(a) if rec.action.is_buy_side() => self.composer.apply_allocation(&rec, a.allocated_fraction),
                | _ => rec,
            })
            .collect();
        (recommendations, allocations)
    }
}
