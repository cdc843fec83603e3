//! Performance-adaptive risk limits.
//!
//! Normal → Cautious on a short losing streak (both caps scaled down),
//! → Cooldown on a longer streak or a poor trailing win rate (both caps zero
//! until the cooldown expires). A strong trailing win rate scales the
//! per-position cap up from Normal, bounded by an absolute ceiling.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{RiskGovernor, RiskLimits, RiskState};
use crate::config::{RiskConfig, MIN_SCALE_UP_LOOKBACK};
use crate::utils::error::Error;
use crate::utils::stats;

/// A closed trade as seen by the risk manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub symbol: String,
    /// Realised return of the trade, e.g. 0.03 for +3%
    pub return_pct: f64,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    pub fn new(symbol: impl Into<String>, return_pct: f64, closed_at: DateTime<Utc>) -> Self {
        Self { symbol: symbol.into(), return_pct, closed_at }
    }

    /// Only strictly positive returns count as wins; flat trades extend a losing streak.
    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakType {
    Winning,
    Losing,
    None,
}

/// Fixed-capacity FIFO of the most recent trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PersistedWindow")]
pub struct PerformanceWindow {
    trailing_trades: VecDeque<TradeOutcome>,
    window_size: usize,
}

/// Wire form of a window, checked before it becomes a [`PerformanceWindow`].
#[derive(Deserialize)]
struct PersistedWindow {
    trailing_trades: VecDeque<TradeOutcome>,
    window_size: usize,
}

impl TryFrom<PersistedWindow> for PerformanceWindow {
    type Error = Error;

    fn try_from(persisted: PersistedWindow) -> Result<Self, Self::Error> {
        if persisted.window_size == 0 {
            return Err(Error::InvalidArgument("performance window size must be > 0".to_string()));
        }
        Ok(Self::seeded(persisted.window_size, persisted.trailing_trades))
    }
}

impl PerformanceWindow {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self { trailing_trades: VecDeque::with_capacity(window_size), window_size }
    }

    /// Rebuild a window from persisted trades, oldest first. Only the last
    /// `window_size` trades are kept.
    pub fn seeded<I>(window_size: usize, trades: I) -> Self
    where
        I: IntoIterator<Item = TradeOutcome>,
    {
        let mut window = Self::new(window_size);
        for trade in trades {
            window.push(trade);
        }
        window
    }

    pub fn push(&mut self, trade: TradeOutcome) {
        while self.trailing_trades.len() >= self.window_size {
            self.trailing_trades.pop_front();
        }
        self.trailing_trades.push_back(trade);
    }

    /// Same trades under a new capacity, keeping the newest when shrinking.
    pub fn resized(self, window_size: usize) -> Self {
        if window_size == self.window_size {
            return self;
        }
        Self::seeded(window_size, self.trailing_trades)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn len(&self) -> usize {
        self.trailing_trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trailing_trades.is_empty()
    }

    pub fn trades(&self) -> impl Iterator<Item = &TradeOutcome> {
        self.trailing_trades.iter()
    }

    pub fn last(&self) -> Option<&TradeOutcome> {
        self.trailing_trades.back()
    }

    /// Fraction of winning trades in the window; 0 when empty.
    pub fn win_rate(&self) -> f64 {
        self.win_rate_last(self.trailing_trades.len())
    }

    /// Win rate over the `n` most recent trades (or fewer if the window is shorter).
    pub fn win_rate_last(&self, n: usize) -> f64 {
        let n = n.min(self.trailing_trades.len());
        if n == 0 {
            return 0.0;
        }
        let wins = self.trailing_trades.iter().rev().take(n).filter(|t| t.is_win()).count();
        wins as f64 / n as f64
    }

    /// Mean return of winning trades.
    pub fn avg_win(&self) -> f64 {
        let wins: Vec<f64> = self.trades().filter(|t| t.is_win()).map(|t| t.return_pct).collect();
        stats::mean(&wins)
    }

    /// Mean loss magnitude of non-winning trades, as a positive number.
    pub fn avg_loss(&self) -> f64 {
        let losses: Vec<f64> = self.trades().filter(|t| !t.is_win()).map(|t| -t.return_pct).collect();
        stats::mean(&losses)
    }

    /// Length of the run of same-outcome trades ending at the newest trade.
    pub fn current_streak(&self) -> u32 {
        let Some(last) = self.trailing_trades.back() else {
            return 0;
        };
        let win = last.is_win();
        self.trailing_trades.iter().rev().take_while(|t| t.is_win() == win).count() as u32
    }

    pub fn streak_type(&self) -> StreakType {
        match self.trailing_trades.back() {
            | Some(t) if t.is_win() => StreakType::Winning,
            | Some(_) => StreakType::Losing,
            | None => StreakType::None,
        }
    }

    /// Consecutive losses ending at the newest trade; 0 on a winning streak.
    pub fn loss_streak(&self) -> u32 {
        match self.streak_type() {
            | StreakType::Losing => self.current_streak(),
            | _ => 0,
        }
    }

    /// Gross profit over gross loss. Infinite with wins and no losses, 0 with no wins.
    pub fn profit_factor(&self) -> f64 {
        let gross_win: f64 = self.trades().filter(|t| t.return_pct > 0.0).map(|t| t.return_pct).sum();
        let gross_loss: f64 = self.trades().filter(|t| t.return_pct < 0.0).map(|t| -t.return_pct).sum();
        if gross_loss > 0.0 {
            gross_win / gross_loss
        } else if gross_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    /// Largest peak-to-trough decline of the cumulative (summed) return curve.
    pub fn max_drawdown(&self) -> f64 {
        let mut equity = 0.0_f64;
        let mut peak = 0.0_f64;
        let mut max_dd = 0.0_f64;
        for t in self.trades() {
            equity += t.return_pct;
            peak = peak.max(equity);
            max_dd = max_dd.max(peak - equity);
        }
        max_dd
    }
}

/// Rolling-window risk manager.
#[derive(Debug, Clone)]
pub struct DynamicRiskManager {
    config: RiskConfig,
    window: PerformanceWindow,
    state: RiskState,
    cooldown_until: Option<DateTime<Utc>>,
    /// Total trades ever recorded
    recorded: u64,
    /// Value of `recorded` when the last cooldown ended
    cooldown_cleared_at: Option<u64>,
}

impl DynamicRiskManager {
    pub fn new(config: RiskConfig) -> Self {
        let window = PerformanceWindow::new(config.window_size);
        Self::with_window(config, window)
    }

    /// Start from a pre-populated window. The window is re-sized to
    /// `config.window_size` and the initial state is derived from it, with any
    /// cooldown measured from the newest trade's close.
    pub fn with_window(config: RiskConfig, window: PerformanceWindow) -> Self {
        let window = window.resized(config.window_size);
        let recorded = window.len() as u64;
        let mut manager = Self {
            config,
            window,
            state: RiskState::Normal,
            cooldown_until: None,
            recorded,
            cooldown_cleared_at: None,
        };
        manager.reevaluate();
        manager
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn state(&self) -> RiskState {
        self.state
    }

    fn cooldown_triggered(&self) -> bool {
        if self.cooldown_cleared_at == Some(self.recorded) {
            return false;
        }
        let cfg = &self.config;
        if self.window.loss_streak() >= cfg.cooldown_loss_streak {
            return true;
        }
        self.window.len() >= cfg.min_trades_for_win_rate && self.window.win_rate() < cfg.min_win_rate
    }

    fn reevaluate(&mut self) {
        if self.state == RiskState::Cooldown {
            return;
        }
        let previous = self.state;
        if self.cooldown_triggered() {
            let closed_at = self.window.last().map(|t| t.closed_at);
            if let Some(closed_at) = closed_at {
                let until = closed_at + Duration::seconds(self.config.cooldown_secs);
                warn!(
                    "Entering cooldown until {}: loss streak {}, win rate {:.2} over {} trades",
                    until,
                    self.window.loss_streak(),
                    self.window.win_rate(),
                    self.window.len()
                );
                self.state = RiskState::Cooldown;
                self.cooldown_until = Some(until);
                return;
            }
        }
        self.state = if self.window.loss_streak() >= self.config.cautious_loss_streak {
            RiskState::Cautious
        } else {
            RiskState::Normal
        };
        if self.state != previous {
            info!("Risk state {} -> {}", previous, self.state);
        }
    }

    fn expire_cooldown(&mut self, now: DateTime<Utc>) {
        if self.state != RiskState::Cooldown {
            return;
        }
        match self.cooldown_until {
            | Some(until) if now < until => {}
            | _ => {
                info!("Cooldown expired at {}", now);
                self.state = RiskState::Normal;
                self.cooldown_until = None;
                self.cooldown_cleared_at = Some(self.recorded);
                self.reevaluate();
            }
        }
    }

    /// Per-position multiplier earned by a strong recent win rate, 1.0 if none.
    fn scale_up_factor(&self) -> f64 {
        let cfg = &self.config;
        let lookback = cfg.scale_up_lookback;
        if lookback < MIN_SCALE_UP_LOOKBACK || self.window.len() < lookback {
            return 1.0;
        }
        let win_rate = self.window.win_rate_last(lookback);
        if win_rate <= cfg.scale_up_win_rate || cfg.scale_up_win_rate >= 1.0 {
            return 1.0;
        }
        let progress = (win_rate - cfg.scale_up_win_rate) / (1.0 - cfg.scale_up_win_rate);
        1.0 + progress * (cfg.max_scale_up - 1.0)
    }

    fn current_limits(&self) -> RiskLimits {
        let cfg = &self.config;
        match self.state {
            | RiskState::Cooldown => RiskLimits {
                state: RiskState::Cooldown,
                max_position_fraction: 0.0,
                max_portfolio_risk_fraction: 0.0,
                cooldown_until: self.cooldown_until,
            },
            | RiskState::Cautious => RiskLimits {
                state: RiskState::Cautious,
                max_position_fraction: cfg.base_max_position_fraction * cfg.cautious_scale,
                max_portfolio_risk_fraction: cfg.max_portfolio_risk_fraction * cfg.cautious_scale,
                cooldown_until: None,
            },
            | RiskState::Normal => {
                let factor = self.scale_up_factor();
                let cap = (cfg.base_max_position_fraction * factor).min(cfg.absolute_max_position_fraction);
                if factor > 1.0 {
                    debug!("Scale-up x{:.3}: per-position cap {:.4}", factor, cap);
                }
                RiskLimits::normal(cap, cfg.max_portfolio_risk_fraction)
            }
        }
    }
}

impl RiskGovernor for DynamicRiskManager {
    fn record_outcome(&mut self, trade: TradeOutcome) -> RiskLimits {
        let closed_at = trade.closed_at;
        self.expire_cooldown(closed_at);
        debug!("Recording {} {:+.4} at {}", trade.symbol, trade.return_pct, closed_at);
        self.window.push(trade);
        self.recorded += 1;
        self.reevaluate();
        self.current_limits()
    }

    fn limits_at(&mut self, now: DateTime<Utc>) -> RiskLimits {
        self.expire_cooldown(now);
        self.current_limits()
    }

    fn window(&self) -> &PerformanceWindow {
        &self.window
    }

    fn box_clone(&self) -> Box<dyn RiskGovernor> {
        Box::new(self.clone())
    }
}
