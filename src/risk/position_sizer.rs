//! Kelly criterion position sizing.
//!
//! kelly_fraction = p − q / b  where
//!   b = payoff ratio (avg gain / avg loss)
//!   p = win rate, q = 1 − p
//! conservative = clamp(max(kelly, 0) × multiplier, 0, max_position_fraction)
//!
//! The portfolio pass then fits every symbol's conservative fraction inside the
//! correlation-group caps and the portfolio risk budget.

use log::{debug, info};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::config::{CorrelationCap, KellyConfig};
use crate::utils::error::{Error, Result};
use crate::utils::types::NumericFlag;

/// Sentinel raw fraction when there is no upside at all.
pub const ZERO_PAYOFF_RAW_FRACTION: f64 = -1.0;

/// Kelly sizing outcome for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyResult {
    pub symbol: String,
    /// Full Kelly fraction; negative when the edge is negative
    pub raw_kelly_fraction: f64,
    /// Fractional, floored and capped Kelly
    pub conservative_fraction: f64,
    pub multiplier_used: f64,
    pub numeric_flag: Option<NumericFlag>,
}

/// Final portfolio weight for one symbol after the waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub symbol: String,
    /// Conservative fraction going into the portfolio pass
    pub requested_fraction: f64,
    /// Fraction after correlation caps and the portfolio budget
    pub allocated_fraction: f64,
    /// 1-based position in the largest-first ordering
    pub rank: usize,
}

/// Fractional Kelly optimizer
#[derive(Debug, Clone, Default)]
pub struct KellyOptimizer {
    config: KellyConfig,
}

impl KellyOptimizer {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Size a single symbol with the configured multiplier.
    pub fn optimize_default(&self, symbol: &str, win_rate: f64, avg_gain: f64, avg_loss: f64) -> Result<KellyResult> {
        self.optimize(symbol, win_rate, avg_gain, avg_loss, self.config.multiplier)
    }

    /// Size a single symbol.
    ///
    /// `win_rate` outside [0, 1] is an `InvalidProbability`; negative or
    /// non-finite payoffs and a multiplier outside (0, 1] are `InvalidArgument`.
    pub fn optimize(
        &self,
        symbol: &str,
        win_rate: f64,
        avg_gain: f64,
        avg_loss: f64,
        multiplier: f64,
    ) -> Result<KellyResult> {
        if !(0.0..=1.0).contains(&win_rate) {
            return Err(Error::InvalidProbability {
                symbol: symbol.to_string(),
                field: "win_rate".to_string(),
                value: win_rate,
            });
        }
        if !avg_gain.is_finite() || avg_gain < 0.0 || !avg_loss.is_finite() || avg_loss < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "{symbol}: avg_gain and avg_loss must be finite and >= 0 (got {avg_gain}, {avg_loss})"
            )));
        }
        if !(multiplier > 0.0 && multiplier <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "{symbol}: Kelly multiplier must be within (0, 1], got {multiplier}"
            )));
        }

        let (raw, numeric_flag) = raw_kelly_fraction(win_rate, avg_gain, avg_loss);
        let conservative = (raw.max(0.0) * multiplier).clamp(0.0, self.config.max_position_fraction);
        debug!(
            "Kelly {}: p={:.4} gain={:.5} loss={:.5} raw={:.6} x{:.2} -> {:.6}",
            symbol, win_rate, avg_gain, avg_loss, raw, multiplier, conservative
        );
        Ok(KellyResult {
            symbol: symbol.to_string(),
            raw_kelly_fraction: raw,
            conservative_fraction: conservative,
            multiplier_used: multiplier,
            numeric_flag,
        })
    }

    /// Fit per-symbol fractions inside correlation caps and a portfolio budget.
    ///
    /// Each correlation group over its cap is scaled down proportionally, then
    /// all fractions are scaled by one common factor so the total fits
    /// `max_portfolio_risk_fraction`. Budget is handed out largest-first, so
    /// rounding can never push the total over the limit. The budget step keeps
    /// the post-cap ranking, but a binding correlation cap can drop a group
    /// member below a symbol it outranked on input. Output is in largest-first
    /// order after the caps.
    pub fn optimize_portfolio(
        &self,
        per_symbol: &[KellyResult],
        correlation_caps: &[CorrelationCap],
        max_portfolio_risk_fraction: f64,
    ) -> Vec<Allocation> {
        let budget = max_portfolio_risk_fraction.max(0.0);
        let mut fractions: Vec<(String, f64, f64)> = per_symbol
            .iter()
            .map(|k| (k.symbol.clone(), k.conservative_fraction, k.conservative_fraction.max(0.0)))
            .collect();

        for cap in correlation_caps {
            let members: Vec<usize> = fractions
                .iter()
                .enumerate()
                .filter(|(_, (sym, _, _))| cap.symbols.iter().any(|s| s == sym))
                .map(|(i, _)| i)
                .collect();
            let group_total: f64 = members.iter().map(|i| fractions[*i].2).sum();
            if group_total > cap.max_fraction && group_total > 0.0 {
                let scale = cap.max_fraction / group_total;
                info!(
                    "Correlation cap {} binding: {:.4} > {:.4}, scaling group by {:.4}",
                    cap.name, group_total, cap.max_fraction, scale
                );
                for i in members {
                    fractions[i].2 *= scale;
                }
            }
        }

        // Largest first; ties broken by symbol for a stable, input-order-free result
        fractions.sort_by(|a, b| OrderedFloat(b.2).cmp(&OrderedFloat(a.2)).then_with(|| a.0.cmp(&b.0)));

        let total: f64 = fractions.iter().map(|f| f.2).sum();
        let scale = if total > budget && total > 0.0 { budget / total } else { 1.0 };
        if scale < 1.0 {
            info!(
                "Portfolio risk budget binding: {:.4} > {:.4}, scaling all positions by {:.4}",
                total, budget, scale
            );
        }

        let mut remaining = budget;
        fractions
            .into_iter()
            .enumerate()
            .map(|(i, (symbol, requested, fraction))| {
                let allocated = (fraction * scale).min(remaining).max(0.0);
                remaining -= allocated;
                Allocation { symbol, requested_fraction: requested, allocated_fraction: allocated, rank: i + 1 }
            })
            .collect()
    }
}

/// Full Kelly fraction and the degenerate case it fell into, if any.
///
/// `avg_loss == 0` yields the win rate; `avg_gain == 0` with a positive
/// `avg_loss`, or a payoff so small the fraction overflows, yields
/// [`ZERO_PAYOFF_RAW_FRACTION`].
pub fn raw_kelly_fraction(win_rate: f64, avg_gain: f64, avg_loss: f64) -> (f64, Option<NumericFlag>) {
    if avg_loss == 0.0 {
        return (win_rate, Some(NumericFlag::ZeroLoss));
    }
    if avg_gain == 0.0 {
        return (ZERO_PAYOFF_RAW_FRACTION, Some(NumericFlag::ZeroPayoff));
    }
    // q·loss/gain rather than q/(gain/loss): the ratio can underflow to 0
    let raw = win_rate - (1.0 - win_rate) * avg_loss / avg_gain;
    if !raw.is_finite() {
        return (ZERO_PAYOFF_RAW_FRACTION, Some(NumericFlag::ZeroPayoff));
    }
    (raw, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn optimizer(cap: f64) -> KellyOptimizer {
        KellyOptimizer::new(KellyConfig { multiplier: 0.5, max_position_fraction: cap })
    }

    fn kelly(symbol: &str, fraction: f64) -> KellyResult {
        KellyResult {
            symbol: symbol.to_string(),
            raw_kelly_fraction: fraction * 2.0,
            conservative_fraction: fraction,
            multiplier_used: 0.5,
            numeric_flag: None,
        }
    }

    #[test]
    fn test_even_odds_has_zero_edge() {
        let r = optimizer(0.15).optimize("SPY", 0.5, 0.04, 0.04, 0.5).unwrap();
        assert_eq!(r.raw_kelly_fraction, 0.0);
        assert_eq!(r.conservative_fraction, 0.0);
    }

    #[test]
    fn test_negative_edge_floors_at_zero() {
        let r = optimizer(0.15).optimize("SPY", 0.0, 0.05, 0.03, 0.5).unwrap();
        assert!(r.raw_kelly_fraction < 0.0);
        assert_eq!(r.conservative_fraction, 0.0);
    }

    #[test]
    fn test_reference_sizing() {
        let r = optimizer(0.15).optimize("AAPL", 0.561, 0.05, 0.03, 0.5).unwrap();
        let expected_raw = 0.561 - 0.439 / (0.05 / 0.03);
        assert!((r.raw_kelly_fraction - expected_raw).abs() < 1e-12);
        assert!((r.raw_kelly_fraction - 0.298).abs() < 1e-3);
        assert!((r.conservative_fraction - expected_raw * 0.5).abs() < 1e-12);
        assert!(r.conservative_fraction < 0.15);
        assert_eq!(r.multiplier_used, 0.5);
    }

    #[test]
    fn test_cap_binds() {
        let r = optimizer(0.10).optimize("AAPL", 0.7, 0.05, 0.02, 1.0).unwrap();
        assert_eq!(r.conservative_fraction, 0.10);
    }

    #[test]
    fn test_degenerate_payoffs() {
        let r = optimizer(0.5).optimize("T", 0.6, 0.02, 0.0, 0.5).unwrap();
        assert_eq!(r.raw_kelly_fraction, 0.6);
        assert_eq!(r.numeric_flag, Some(NumericFlag::ZeroLoss));

        let r = optimizer(0.5).optimize("T", 0.6, 0.0, 0.02, 0.5).unwrap();
        assert_eq!(r.raw_kelly_fraction, ZERO_PAYOFF_RAW_FRACTION);
        assert_eq!(r.conservative_fraction, 0.0);
        assert_eq!(r.numeric_flag, Some(NumericFlag::ZeroPayoff));
    }

    #[test]
    fn test_extreme_payoff_ratios_stay_finite() {
        // gain/loss underflows to 0 here
        let (raw, flag) = raw_kelly_fraction(1.0, 1e-320, 1e10);
        assert_eq!(raw, 1.0);
        assert_eq!(flag, None);

        let (raw, flag) = raw_kelly_fraction(0.5, 1e-320, 1e10);
        assert_eq!(raw, ZERO_PAYOFF_RAW_FRACTION);
        assert_eq!(flag, Some(NumericFlag::ZeroPayoff));

        let r = optimizer(0.25).optimize("T", 0.9, 1e-300, 0.5, 0.5).unwrap();
        assert!(r.raw_kelly_fraction.is_finite());
        assert_eq!(r.conservative_fraction, 0.0);
    }

    #[test]
    fn test_input_validation() {
        let opt = optimizer(0.15);
        assert_matches!(opt.optimize("X", 1.01, 0.05, 0.03, 0.5), Err(Error::InvalidProbability { .. }));
        assert_matches!(opt.optimize("X", -0.1, 0.05, 0.03, 0.5), Err(Error::InvalidProbability { .. }));
        assert_matches!(opt.optimize("X", 0.5, -0.05, 0.03, 0.5), Err(Error::InvalidArgument(_)));
        assert_matches!(opt.optimize("X", 0.5, 0.05, 0.03, 0.0), Err(Error::InvalidArgument(_)));
        assert_matches!(opt.optimize("X", 0.5, 0.05, 0.03, 1.5), Err(Error::InvalidArgument(_)));
    }

    #[test]
    fn test_portfolio_under_budget_is_untouched() {
        let allocs = optimizer(0.15).optimize_portfolio(&[kelly("A", 0.1), kelly("B", 0.05)], &[], 0.5);
        assert_eq!(allocs[0].symbol, "A");
        assert_eq!(allocs[0].allocated_fraction, 0.1);
        assert_eq!(allocs[1].allocated_fraction, 0.05);
    }

    #[test]
    fn test_portfolio_scales_proportionally_and_preserves_rank() {
        let inputs = [kelly("C", 0.10), kelly("A", 0.15), kelly("B", 0.15), kelly("D", 0.05)];
        let allocs = optimizer(0.15).optimize_portfolio(&inputs, &[], 0.30);
        let total: f64 = allocs.iter().map(|a| a.allocated_fraction).sum();
        assert!(total <= 0.30 + 1e-15);
        let order: Vec<&str> = allocs.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
        for w in allocs.windows(2) {
            assert!(w[0].allocated_fraction >= w[1].allocated_fraction);
        }
        // 0.45 total scaled to 0.30
        assert!((allocs[2].allocated_fraction - 0.10 * (0.30 / 0.45)).abs() < 1e-12);
        assert_eq!(allocs[0].rank, 1);
    }

    #[test]
    fn test_correlation_cap_applies_before_budget() {
        let caps = vec![CorrelationCap {
            name: "semis".to_string(),
            symbols: vec!["NVDA".to_string(), "AMD".to_string()],
            max_fraction: 0.12,
        }];
        let inputs = [kelly("NVDA", 0.12), kelly("AMD", 0.06), kelly("XOM", 0.1)];
        let allocs = optimizer(0.15).optimize_portfolio(&inputs, &caps, 1.0);
        let get = |s: &str| allocs.iter().find(|a| a.symbol == s).unwrap().allocated_fraction;
        assert!((get("NVDA") - 0.08).abs() < 1e-12);
        assert!((get("AMD") - 0.04).abs() < 1e-12);
        assert_eq!(get("XOM"), 0.1);
        // the binding cap moves NVDA below XOM
        assert_eq!(allocs[0].symbol, "XOM");
        assert_eq!(allocs[1].symbol, "NVDA");
    }

    #[test]
    fn test_zero_budget_allocates_nothing() {
        let allocs = optimizer(0.15).optimize_portfolio(&[kelly("A", 0.1)], &[], 0.0);
        assert_eq!(allocs[0].allocated_fraction, 0.0);
        assert_eq!(allocs[0].requested_fraction, 0.1);
    }
}
