//! Configuration template generation

use crate::config::AdvisorConfig;
use crate::utils::error::Result;
use std::fs;
use std::path::Path;

/// Generate a default configuration file at the specified path
pub fn generate_config_template<P: AsRef<Path>>(path: P) -> Result<()> {
    AdvisorConfig::default().save_to_file(path)
}

/// Commented configuration template with the reference thresholds.
pub const COMMENTED_TEMPLATE: &str = r#"# Position advisor configuration
# Every section is optional; omitted keys fall back to the defaults shown here.
# Any key can be overridden from the environment, e.g. ADVISOR_KELLY__MULTIPLIER=0.25

version = "0.1.0"

[aggregator.source_weights]
# Multipliers applied on top of each signal's own weight
technical = 1.0
sentiment = 1.0
institutional = 1.0
government_contract = 1.0
fundamental = 1.0

[expected_value]
# Penalty applied to the scenario standard deviation
risk_aversion = 1.0
# Periods per year (252 trading days)
annualization_factor = 252.0
# Fewer historical returns than this degrades the symbol to hold
min_observations = 20

[expected_value.scenario_weights]
# Must sum to 1
bull = 0.25
base = 0.40
bear = 0.20
crash = 0.05
melt_up = 0.10

[kelly]
# Fraction of full Kelly to commit
multiplier = 0.5
# Hard cap on a single Kelly fraction; at least risk.absolute_max_position_fraction
max_position_fraction = 0.25

[risk]
window_size = 20
base_max_position_fraction = 0.15
max_portfolio_risk_fraction = 0.5
cautious_loss_streak = 2
cautious_scale = 0.5
cooldown_loss_streak = 3
min_win_rate = 0.45
min_trades_for_win_rate = 10
scale_up_win_rate = 0.6
# At least 10 trades
scale_up_lookback = 10
max_scale_up = 2.0
absolute_max_position_fraction = 0.25
# 48 hours
cooldown_secs = 172800

[portfolio]
# [[portfolio.correlation_caps]]
# name = "megacap_tech"
# symbols = ["AAPL", "MSFT", "GOOGL"]
# max_fraction = 0.25

[composer]
available_capital = 10000.0

[logging]
level = "info"
"#;

/// Generate a configuration file with comments explaining each field
pub fn generate_commented_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    fs::write(path, COMMENTED_TEMPLATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_commented_template_matches_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("advisor.toml");
        generate_commented_config_template(&path).unwrap();
        let cfg = AdvisorConfig::from_file(&path).unwrap();
        assert_eq!(cfg, AdvisorConfig::default());
    }

    #[test]
    fn test_generated_template_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("advisor.toml");
        generate_config_template(&path).unwrap();
        assert!(AdvisorConfig::from_file(&path).is_ok());
    }
}
