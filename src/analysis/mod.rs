//! Analysis module: scenario expected value and return-distribution risk metrics

pub mod expected_value;

pub use expected_value::{
    evaluate, EvResult, EvTier, ExpectedValueCalculator, ReturnDistribution, Scenario, ScenarioSet,
};
