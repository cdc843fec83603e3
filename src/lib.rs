//! # Position Advisor
//! Turns per-symbol trading signals and return histories into risk-adjusted
//! position-size recommendations.
//!
//! One cycle runs signal aggregation, scenario expected value, fractional Kelly
//! sizing and the recommendation composer for every symbol, under limits set by
//! a performance-adaptive risk manager, then fits the buy side into the
//! portfolio risk budget.

pub use crate::utils::error::{Error, Result};

pub mod analysis;
pub mod config;
pub mod engine;
pub mod recommendation;
pub mod risk;
pub mod signal;
pub mod utils;

pub use crate::analysis::{EvResult, EvTier, ReturnDistribution, Scenario, ScenarioSet};
pub use crate::config::AdvisorConfig;
pub use crate::engine::{AdvisorEngine, CycleReport, SymbolFailure, SymbolInput};
pub use crate::recommendation::{Recommendation, RecommendationComposer};
pub use crate::risk::{
    DynamicRiskManager, KellyOptimizer, KellyResult, PerformanceWindow, RiskGovernor, RiskLimits, RiskState,
    SharedRiskManager, TradeOutcome,
};
pub use crate::signal::{AggregatedSignal, SignalAction, SignalAggregator, SignalSource, SymbolSignal};
