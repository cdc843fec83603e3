//! Shared building blocks: errors, logging, statistics and the signal vocabulary.

pub mod error;
mod logging;
pub mod stats;
pub mod types;

pub use error::{Error, Result};
pub use logging::{init_logging, init_test_logging};
pub use types::*;
