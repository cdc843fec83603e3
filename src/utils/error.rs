//! Error handling for the recommendation core.

use thiserror::Error;

/// Main error type for the recommendation core
#[derive(Debug, Error)]
pub enum Error {
    /// A signal carried a non-positive or non-finite weight
    #[error("Invalid weight for {symbol}: {weight}")]
    InvalidWeight { symbol: String, weight: f64 },

    /// A probability-like input fell outside [0, 1]
    #[error("Invalid probability for {symbol}: {field}={value}")]
    InvalidProbability { symbol: String, field: String, value: f64 },

    /// Too few historical observations to score a symbol
    #[error("Insufficient history for {symbol}: {observed} observations, need {required}")]
    InsufficientHistory { symbol: String, observed: usize, required: usize },

    /// A computation produced a non-finite value from finite inputs
    #[error("Numeric degenerate result for {symbol}: {detail}")]
    NumericDegenerate { symbol: String, detail: String },

    /// Aggregation was asked to run over an empty signal list
    #[error("No signals supplied for {0}")]
    NoSignals(String),

    /// Signals for different symbols were mixed in one aggregation
    #[error("Symbol mismatch: expected {expected}, found {found}")]
    SymbolMismatch { expected: String, found: String },

    /// The same symbol appeared more than once in one cycle
    #[error("Duplicate symbol in cycle: {symbol} ({count} inputs)")]
    DuplicateSymbol { symbol: String, count: usize },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Layered configuration loading errors
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Invalid argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Symbol the error is scoped to, when it is a per-symbol validation outcome.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            | Error::InvalidWeight { symbol, .. }
            | Error::InvalidProbability { symbol, .. }
            | Error::InsufficientHistory { symbol, .. }
            | Error::NumericDegenerate { symbol, .. } => Some(symbol),
            | Error::NoSignals(symbol) | Error::DuplicateSymbol { symbol, .. } => Some(symbol),
            | Error::SymbolMismatch { expected, .. } => Some(expected),
            | _ => None,
        }
    }

    /// Short machine-readable kind used in batch failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            | Error::InvalidWeight { .. } => "invalid_weight",
            | Error::InvalidProbability { .. } => "invalid_probability",
            | Error::InsufficientHistory { .. } => "insufficient_history",
            | Error::NumericDegenerate { .. } => "numeric_degenerate",
            | Error::NoSignals(_) => "no_signals",
            | Error::SymbolMismatch { .. } => "symbol_mismatch",
            | Error::DuplicateSymbol { .. } => "duplicate_symbol",
            | Error::ConfigError(_) | Error::Settings(_) => "config",
            | Error::IoError(_) => "io",
            | Error::JsonError(_) | Error::TomlError(_) | Error::TomlSerializeError(_) => "serde",
            | Error::InvalidArgument(_) => "invalid_argument",
            | Error::Other(_) => "other",
        }
    }
}

/// Result type for the recommendation core
pub type Result<T> = std::result::Result<T, Error>;

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

// Allow automatic conversion from anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
