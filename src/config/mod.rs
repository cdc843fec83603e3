//! Configuration module for the advisor

mod template;

use crate::utils::error::{Error, Result};
use crate::utils::types::SignalSource;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use template::{generate_commented_config_template, generate_config_template};

/// Prefix for environment overrides, e.g. `ADVISOR_KELLY__MULTIPLIER=0.25`.
pub const ENV_PREFIX: &str = "ADVISOR";

/// Fewest trailing trades a scale-up decision may be based on.
pub const MIN_SCALE_UP_LOOKBACK: usize = 10;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Configuration file version
    pub version: String,

    /// Signal aggregation configuration
    pub aggregator: AggregatorConfig,

    /// Expected value / risk metric configuration
    pub expected_value: ExpectedValueConfig,

    /// Kelly sizing configuration
    pub kelly: KellyConfig,

    /// Dynamic risk manager configuration
    pub risk: RiskConfig,

    /// Portfolio-level allocation configuration
    pub portfolio: PortfolioConfig,

    /// Recommendation composer configuration
    pub composer: ComposerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Signal aggregation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Per-source multipliers applied on top of each signal's own weight
    pub source_weights: SourceWeights,
}

/// Weighting table with one entry per [`SignalSource`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    pub technical: f64,
    pub sentiment: f64,
    pub institutional: f64,
    pub government_contract: f64,
    pub fundamental: f64,
}

impl SourceWeights {
    /// Multiplier for a source. The match is exhaustive over [`SignalSource`].
    pub fn multiplier(&self, source: SignalSource) -> f64 {
        match source {
            | SignalSource::Technical => self.technical,
            | SignalSource::Sentiment => self.sentiment,
            | SignalSource::Institutional => self.institutional,
            | SignalSource::GovernmentContract => self.government_contract,
            | SignalSource::Fundamental => self.fundamental,
        }
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            technical: 1.0,
            sentiment: 1.0,
            institutional: 1.0,
            government_contract: 1.0,
            fundamental: 1.0,
        }
    }
}

/// Expected value / risk metric configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedValueConfig {
    /// Penalty λ applied to the scenario standard deviation
    pub risk_aversion: f64,

    /// Periods per year used to annualize Sharpe/Sortino (252 for daily bars)
    pub annualization_factor: f64,

    /// Minimum number of historical returns required to score a symbol
    pub min_observations: usize,

    /// Probabilities for the canonical bull/base/bear/crash/melt-up set
    pub scenario_weights: ScenarioWeights,
}

impl Default for ExpectedValueConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 1.0,
            annualization_factor: 252.0,
            min_observations: 20,
            scenario_weights: ScenarioWeights::default(),
        }
    }
}

/// Probabilities for the canonical scenario set. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioWeights {
    pub bull: f64,
    pub base: f64,
    pub bear: f64,
    pub crash: f64,
    pub melt_up: f64,
}

impl ScenarioWeights {
    pub fn total(&self) -> f64 {
        self.bull + self.base + self.bear + self.crash + self.melt_up
    }
}

impl Default for ScenarioWeights {
    fn default() -> Self {
        Self { bull: 0.25, base: 0.40, bear: 0.20, crash: 0.05, melt_up: 0.10 }
    }
}

/// Kelly sizing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Fraction of full Kelly to commit (0.5 = half Kelly)
    pub multiplier: f64,

    /// Hard cap on any single conservative fraction. Must not sit below
    /// `risk.absolute_max_position_fraction`, or scale-up could never take effect.
    pub max_position_fraction: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self { multiplier: 0.5, max_position_fraction: 0.25 }
    }
}

/// Dynamic risk manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Number of trailing trades kept in the performance window
    pub window_size: usize,

    /// Per-position cap in the Normal state
    pub base_max_position_fraction: f64,

    /// Portfolio-wide risk budget in the Normal state
    pub max_portfolio_risk_fraction: f64,

    /// Consecutive losses that move Normal to Cautious
    pub cautious_loss_streak: u32,

    /// Multiplier applied to both caps while Cautious
    pub cautious_scale: f64,

    /// Consecutive losses that trigger Cooldown
    pub cooldown_loss_streak: u32,

    /// Trailing win rate below which Cooldown triggers
    pub min_win_rate: f64,

    /// Trades required in the window before the win-rate floor applies
    pub min_trades_for_win_rate: usize,

    /// Trailing win rate that must be strictly exceeded to scale up
    pub scale_up_win_rate: f64,

    /// Number of most recent trades the scale-up win rate is measured over
    pub scale_up_lookback: usize,

    /// Largest multiple of the base cap reachable through scale-up
    pub max_scale_up: f64,

    /// Absolute ceiling on the per-position cap regardless of scale-up
    pub absolute_max_position_fraction: f64,

    /// Cooldown length in seconds, measured from the triggering trade's close
    pub cooldown_secs: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            base_max_position_fraction: 0.15,
            max_portfolio_risk_fraction: 0.50,
            cautious_loss_streak: 2,
            cautious_scale: 0.5,
            cooldown_loss_streak: 3,
            min_win_rate: 0.45,
            min_trades_for_win_rate: 10,
            scale_up_win_rate: 0.60,
            scale_up_lookback: 10,
            max_scale_up: 2.0,
            absolute_max_position_fraction: 0.25,
            cooldown_secs: 48 * 3600,
        }
    }
}

/// Upper bound on the combined allocation of a group of correlated symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationCap {
    /// Group label, used in logs and rationale
    pub name: String,
    /// Symbols belonging to the group
    pub symbols: Vec<String>,
    /// Maximum combined fraction for the group
    pub max_fraction: f64,
}

/// Portfolio-level allocation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Correlated-group caps applied before the portfolio budget
    pub correlation_caps: Vec<CorrelationCap>,
}

/// Recommendation composer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Capital available for new positions, in account currency
    pub available_capital: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self { available_capital: 10_000.0 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            aggregator: AggregatorConfig::default(),
            expected_value: ExpectedValueConfig::default(),
            kelly: KellyConfig::default(),
            risk: RiskConfig::default(),
            portfolio: PortfolioConfig::default(),
            composer: ComposerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::ConfigError(format!("{name} must be within [0, 1], got {value}")));
    }
    Ok(())
}

impl AdvisorConfig {
    /// Serialize default config to TOML string
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Load configuration from a specific TOML file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {:?}: {}", path.as_ref(), e))
        })?;
        let cfg: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Layered load: built-in defaults, then an optional TOML file, then
    /// `ADVISOR_<SECTION>__<KEY>` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(&Self::default_toml()?, config::FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Install the global logger at the configured level.
    pub fn init_logging(&self) {
        crate::utils::init_logging(&self.logging.level);
    }

    /// Validate the configuration for reasonable values
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::ConfigError("Config version must be set (e.g., '0.1.0')".to_string()));
        }

        // Aggregator
        for source in SignalSource::ALL {
            let w = self.aggregator.source_weights.multiplier(source);
            if !w.is_finite() || w <= 0.0 {
                return Err(Error::ConfigError(format!("source weight for {source} must be > 0")));
            }
        }

        // Expected value
        let ev = &self.expected_value;
        if !ev.risk_aversion.is_finite() || ev.risk_aversion < 0.0 {
            return Err(Error::ConfigError("risk_aversion must be >= 0".to_string()));
        }
        if !ev.annualization_factor.is_finite() || ev.annualization_factor <= 0.0 {
            return Err(Error::ConfigError("annualization_factor must be > 0".to_string()));
        }
        if ev.min_observations < 2 {
            return Err(Error::ConfigError("min_observations must be >= 2".to_string()));
        }
        let w = &ev.scenario_weights;
        for (name, p) in [
            ("bull", w.bull),
            ("base", w.base),
            ("bear", w.bear),
            ("crash", w.crash),
            ("melt_up", w.melt_up),
        ] {
            check_fraction(&format!("scenario_weights.{name}"), p)?;
        }
        if (w.total() - 1.0).abs() > 1e-6 {
            return Err(Error::ConfigError(format!(
                "scenario_weights must sum to 1, got {:.6}",
                w.total()
            )));
        }

        // Kelly
        if !(self.kelly.multiplier > 0.0 && self.kelly.multiplier <= 1.0) {
            return Err(Error::ConfigError("kelly.multiplier must be within (0, 1]".to_string()));
        }
        check_fraction("kelly.max_position_fraction", self.kelly.max_position_fraction)?;

        // Risk
        let r = &self.risk;
        if r.window_size == 0 {
            return Err(Error::ConfigError("risk.window_size must be > 0".to_string()));
        }
        check_fraction("risk.base_max_position_fraction", r.base_max_position_fraction)?;
        check_fraction("risk.max_portfolio_risk_fraction", r.max_portfolio_risk_fraction)?;
        check_fraction("risk.cautious_scale", r.cautious_scale)?;
        check_fraction("risk.min_win_rate", r.min_win_rate)?;
        check_fraction("risk.scale_up_win_rate", r.scale_up_win_rate)?;
        check_fraction("risk.absolute_max_position_fraction", r.absolute_max_position_fraction)?;
        if r.cautious_loss_streak == 0 || r.cooldown_loss_streak <= r.cautious_loss_streak {
            return Err(Error::ConfigError(
                "risk.cooldown_loss_streak must exceed risk.cautious_loss_streak (> 0)".to_string(),
            ));
        }
        if r.scale_up_lookback < MIN_SCALE_UP_LOOKBACK || r.scale_up_lookback > r.window_size {
            return Err(Error::ConfigError(format!(
                "risk.scale_up_lookback must be within {MIN_SCALE_UP_LOOKBACK}..=window_size"
            )));
        }
        if r.min_trades_for_win_rate > r.window_size {
            return Err(Error::ConfigError(
                "risk.min_trades_for_win_rate cannot exceed window_size".to_string(),
            ));
        }
        if !r.max_scale_up.is_finite() || r.max_scale_up < 1.0 {
            return Err(Error::ConfigError("risk.max_scale_up must be >= 1".to_string()));
        }
        if r.absolute_max_position_fraction < r.base_max_position_fraction {
            return Err(Error::ConfigError(
                "risk.absolute_max_position_fraction cannot be below the base cap".to_string(),
            ));
        }
        if self.kelly.max_position_fraction < r.absolute_max_position_fraction {
            return Err(Error::ConfigError(
                "kelly.max_position_fraction cannot be below risk.absolute_max_position_fraction".to_string(),
            ));
        }
        if r.cooldown_secs <= 0 {
            return Err(Error::ConfigError("risk.cooldown_secs must be > 0".to_string()));
        }

        // Portfolio
        for cap in &self.portfolio.correlation_caps {
            check_fraction(&format!("correlation cap {}", cap.name), cap.max_fraction)?;
            if cap.symbols.is_empty() {
                return Err(Error::ConfigError(format!(
                    "correlation cap {} lists no symbols",
                    cap.name
                )));
            }
        }

        // Composer
        if !self.composer.available_capital.is_finite() || self.composer.available_capital < 0.0 {
            return Err(Error::ConfigError("composer.available_capital must be >= 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AdvisorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.kelly.multiplier, 0.5);
        assert_eq!(config.risk.cooldown_loss_streak, 3);
        assert!((config.expected_value.scenario_weights.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("advisor.toml");

        let mut config = AdvisorConfig::default();
        config.composer.available_capital = 25_000.0;
        config.portfolio.correlation_caps.push(CorrelationCap {
            name: "megacap_tech".to_string(),
            symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
            max_fraction: 0.2,
        });

        config.save_to_file(&config_path).unwrap();
        let loaded = AdvisorConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let cfg: AdvisorConfig = toml::from_str("[kelly]\nmultiplier = 0.25\n").unwrap();
        assert_eq!(cfg.kelly.multiplier, 0.25);
        assert_eq!(cfg.kelly.max_position_fraction, 0.25);
        assert_eq!(cfg.risk, RiskConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AdvisorConfig::default();
        config.kelly.multiplier = 0.0;
        assert!(config.validate().is_err());

        let mut config = AdvisorConfig::default();
        config.expected_value.scenario_weights.bull = 0.15;
        assert!(config.validate().is_err());

        let mut config = AdvisorConfig::default();
        config.risk.cooldown_loss_streak = 2;
        assert!(config.validate().is_err());

        let mut config = AdvisorConfig::default();
        config.aggregator.source_weights.sentiment = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_settings_that_disable_scale_up() {
        let mut config = AdvisorConfig::default();
        config.risk.scale_up_lookback = 5;
        assert!(matches!(config.validate(), Err(Error::ConfigError(msg)) if msg.contains("scale_up_lookback")));

        let mut config = AdvisorConfig::default();
        config.kelly.max_position_fraction = 0.15;
        assert!(matches!(config.validate(), Err(Error::ConfigError(msg)) if msg.contains("kelly.max_position_fraction")));

        let mut config = AdvisorConfig::default();
        config.risk.scale_up_lookback = MIN_SCALE_UP_LOOKBACK;
        config.kelly.max_position_fraction = config.risk.absolute_max_position_fraction;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_layered_load_with_env_override() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("advisor.toml");
        std::fs::write(&path, "[composer]\navailable_capital = 5000.0\n").unwrap();

        temp_env::with_vars(
            vec![
                ("ADVISOR_KELLY__MULTIPLIER", Some("0.25")),
                ("ADVISOR_RISK__WINDOW_SIZE", Some("30")),
            ],
            || {
                let cfg = AdvisorConfig::load(Some(&path)).unwrap();
                assert_eq!(cfg.composer.available_capital, 5000.0);
                assert_eq!(cfg.kelly.multiplier, 0.25);
                assert_eq!(cfg.risk.window_size, 30);
                assert_eq!(cfg.risk.cooldown_loss_streak, 3);
            },
        );
    }
}
