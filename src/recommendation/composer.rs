//! Combines the aggregated signal, expected value and Kelly sizing under the
//! current risk limits.

use log::{debug, warn};

use super::Recommendation;
use crate::analysis::{EvResult, EvTier};
use crate::config::ComposerConfig;
use crate::risk::{KellyResult, RiskLimits};
use crate::signal::{AggregatedSignal, SignalAction};

/// Why a buy-side signal was turned into a hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Veto {
    AvoidTier,
    Cooldown,
}

impl Veto {
    fn as_str(self) -> &'static str {
        match self {
            | Veto::AvoidTier => "ev_tier_avoid",
            | Veto::Cooldown => "risk_cooldown",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationComposer {
    config: ComposerConfig,
}

impl RecommendationComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Build the recommendation for one symbol. Pure: identical inputs give an
    /// identical result, rationale included.
    pub fn compose(
        &self,
        aggregated: &AggregatedSignal,
        ev: &EvResult,
        kelly: &KellyResult,
        limits: &RiskLimits,
    ) -> Recommendation {
        let veto = if aggregated.action.is_buy_side() {
            if ev.tier == EvTier::Avoid {
                Some(Veto::AvoidTier)
            } else if limits.is_cooldown() {
                Some(Veto::Cooldown)
            } else {
                None
            }
        } else {
            None
        };
        if let Some(v) = veto {
            warn!("Vetoing {} {} -> hold ({})", aggregated.symbol, aggregated.action, v.as_str());
        }

        let action = if veto.is_some() { SignalAction::Hold } else { aggregated.action };
        let position_fraction = match action {
            | SignalAction::Hold => 0.0,
            | _ => kelly.conservative_fraction.min(limits.max_position_fraction).max(0.0),
        };

        let mut flags: Vec<&str> = ev.numeric_flags.iter().map(|f| f.as_str()).collect();
        if let Some(flag) = kelly.numeric_flag {
            flags.push(flag.as_str());
        }

        let rationale = format!(
            "{} ({} score={:+.4}, confidence={:.4}); kelly raw={:.4} conservative={:.4} cap={:.4} -> fraction={:.4}; \
             ev={:+.5} risk_adjusted={:+.5} p_loss={:.4} tier={}; risk_state={}; veto={}; flags=[{}]",
            action,
            aggregated.action,
            aggregated.score,
            aggregated.confidence,
            kelly.raw_kelly_fraction,
            kelly.conservative_fraction,
            limits.max_position_fraction,
            position_fraction,
            ev.expected_value,
            ev.risk_adjusted_ev,
            ev.probability_of_loss,
            ev.tier,
            limits.state,
            veto.map(Veto::as_str).unwrap_or("none"),
            flags.join(",")
        );
        debug!("Composed {}: {}", aggregated.symbol, rationale);

        Recommendation {
            symbol: aggregated.symbol.clone(),
            action,
            position_fraction,
            dollar_amount: position_fraction * self.config.available_capital,
            confidence: aggregated.confidence,
            rationale,
            risk_tier: ev.tier,
        }
    }

    /// Degraded hold for a symbol without enough return history to size.
    pub fn insufficient_history(&self, symbol: &str, reason: &str) -> Recommendation {
        Recommendation {
            symbol: symbol.to_string(),
            action: SignalAction::Hold,
            position_fraction: 0.0,
            dollar_amount: 0.0,
            confidence: 0.0,
            rationale: format!("hold: insufficient history ({reason})"),
            risk_tier: EvTier::Avoid,
        }
    }

    /// Lower a recommendation's fraction to its portfolio allocation. Never
    /// raises it; a fraction that drops to zero turns the action into a hold.
    pub fn apply_allocation(&self, rec: &Recommendation, allocated_fraction: f64) -> Recommendation {
        let fraction = allocated_fraction.clamp(0.0, rec.position_fraction);
        if fraction == rec.position_fraction {
            return rec.clone();
        }
        let action = if fraction > 0.0 { rec.action } else { SignalAction::Hold };
        Recommendation {
            action,
            position_fraction: fraction,
            dollar_amount: fraction * self.config.available_capital,
            rationale: format!("{}; portfolio allocation {:.4} -> {:.4}", rec.rationale, rec.position_fraction, fraction),
            ..rec.clone()
        }
    }
}
