//! env_logger setup for the advisor.
//!
//! `POSITION_ADVISOR_LOG` overrides the level (any env_logger filter spec works,
//! e.g. `position_advisor::risk=debug`), `POSITION_ADVISOR_LOG_STYLE` the colouring.

use chrono::Utc;
use env_logger::{Builder, Env, Target};
use log::{info, Level};
use std::io::Write;

pub const LOG_ENV: &str = "POSITION_ADVISOR_LOG";
pub const LOG_STYLE_ENV: &str = "POSITION_ADVISOR_LOG_STYLE";

const CRATE_PREFIX: &str = "position_advisor::";

fn level_colour(level: Level) -> &'static str {
    match level {
        | Level::Error => "\x1b[31m",
        | Level::Warn => "\x1b[33m",
        | Level::Info => "\x1b[32m",
        | Level::Debug => "\x1b[36m",
        | Level::Trace => "\x1b[35m",
    }
}

/// Module path without the crate prefix, e.g. `risk::dynamic`.
fn short_target(target: &str) -> &str {
    target.strip_prefix(CRATE_PREFIX).unwrap_or(target)
}

/// Install the global logger on stderr. Later calls are no-ops.
pub fn init_logging(level: &str) {
    let env = Env::default().filter_or(LOG_ENV, level).write_style_or(LOG_STYLE_ENV, "auto");

    let installed = Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {}{:5}\x1b[0m {:<24} {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                level_colour(record.level()),
                record.level(),
                short_target(record.target()),
                record.args()
            )
        })
        .target(Target::Stderr)
        .try_init()
        .is_ok();

    if installed {
        info!("Logging initialized at level: {}", level);
    }
}

/// Captured logger for tests; debug unless `POSITION_ADVISOR_LOG` says otherwise.
pub fn init_test_logging() {
    let _ = Builder::from_env(Env::default().filter_or(LOG_ENV, "debug")).is_test(true).try_init();
}
