//! Weighted-vote signal fusion.
//!
//! Each signal contributes `score(action) × weight × confidence`; the sum is
//! normalised by total weight and bucketed back to an action with
//! half-away-from-zero rounding. Inputs are sorted into a canonical order
//! before any floating-point summation, so the result does not depend on the
//! order the collaborators delivered them in.

use std::collections::BTreeMap;

use log::{debug, warn};
use ordered_float::OrderedFloat;

use super::{AggregatedSignal, SignalAction, SignalSource, SymbolSignal};
use crate::config::SourceWeights;
use crate::utils::error::{Error, Result};

/// Signal aggregator with a per-source weighting table.
#[derive(Debug, Clone, Default)]
pub struct SignalAggregator {
    weights: SourceWeights,
}

/// Aggregate with the default (uniform) source weighting table.
pub fn aggregate(signals: &[SymbolSignal]) -> Result<AggregatedSignal> {
    SignalAggregator::default().aggregate(signals)
}

fn validate(signal: &SymbolSignal, symbol: &str) -> Result<()> {
    if signal.symbol != symbol {
        return Err(Error::SymbolMismatch {
            expected: symbol.to_string(),
            found: signal.symbol.clone(),
        });
    }
    if !signal.weight.is_finite() || signal.weight <= 0.0 {
        return Err(Error::InvalidWeight { symbol: symbol.to_string(), weight: signal.weight });
    }
    if !(0.0..=1.0).contains(&signal.confidence) {
        return Err(Error::InvalidProbability {
            symbol: symbol.to_string(),
            field: format!("{}.confidence", signal.source),
            value: signal.confidence,
        });
    }
    Ok(())
}

type CanonicalKey = (SignalSource, i64, u32, SignalAction, OrderedFloat<f64>, OrderedFloat<f64>);

fn canonical_key(s: &SymbolSignal) -> CanonicalKey {
    (
        s.source,
        s.timestamp.timestamp(),
        s.timestamp.timestamp_subsec_nanos(),
        s.action,
        OrderedFloat(s.weight),
        OrderedFloat(s.confidence),
    )
}

impl SignalAggregator {
    pub fn new(weights: SourceWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &SourceWeights {
        &self.weights
    }

    /// Merge all signals for a single symbol into one action and confidence.
    pub fn aggregate(&self, signals: &[SymbolSignal]) -> Result<AggregatedSignal> {
        let first = signals.first().ok_or_else(|| Error::NoSignals("<empty batch>".to_string()))?;
        let symbol = first.symbol.as_str();
        for s in signals {
            validate(s, symbol)?;
        }

        let mut ordered = signals.to_vec();
        ordered.sort_by_key(canonical_key);

        let mut total_weight = 0.0;
        let mut weighted_score = 0.0;
        let mut weighted_confidence = 0.0;
        let mut parts = Vec::with_capacity(ordered.len());
        for s in &ordered {
            let w = s.weight * self.weights.multiplier(s.source);
            total_weight += w;
            weighted_score += s.action.score() as f64 * w * s.confidence;
            weighted_confidence += s.confidence * w;
            parts.push(format!("{}:{}@{:.2}x{:.2}", s.source, s.action, s.confidence, w));
        }

        // total_weight > 0 is guaranteed by validation
        let score = (weighted_score / total_weight).clamp(-2.0, 2.0);
        let confidence = (weighted_confidence / total_weight).clamp(0.0, 1.0);
        let action = SignalAction::from_score(score);

        let rationale = format!(
            "score={:+.4} -> {} from {} signal(s) [{}]; confidence={:.4}",
            score,
            action,
            ordered.len(),
            parts.join(", "),
            confidence
        );
        debug!("Aggregated {}: {}", symbol, rationale);

        Ok(AggregatedSignal {
            symbol: symbol.to_string(),
            action,
            score,
            confidence,
            contributing_signals: ordered,
            rationale,
        })
    }

    /// Group a mixed batch by symbol and aggregate each group independently.
    ///
    /// A malformed signal only fails its own symbol.
    pub fn aggregate_by_symbol(
        &self,
        signals: &[SymbolSignal],
    ) -> BTreeMap<String, Result<AggregatedSignal>> {
        let mut groups: BTreeMap<String, Vec<SymbolSignal>> = BTreeMap::new();
        for s in signals {
            groups.entry(s.symbol.clone()).or_default().push(s.clone());
        }
        groups
            .into_iter()
            .map(|(symbol, group)| {
                let res = self.aggregate(&group);
                if let Err(e) = &res {
                    warn!("Signal aggregation failed for {}: {}", symbol, e);
                }
                (symbol, res)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rstest::rstest;

    fn sig(source: SignalSource, action: SignalAction, confidence: f64, weight: f64) -> SymbolSignal {
        let ts = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        SymbolSignal::new("NVDA", source, action, confidence, weight, ts)
    }

    #[test]
    fn test_weighted_vote() {
        let signals = vec![
            sig(SignalSource::Technical, SignalAction::StrongBuy, 0.9, 2.0),
            sig(SignalSource::Sentiment, SignalAction::Sell, 0.5, 1.0),
            sig(SignalSource::Institutional, SignalAction::Buy, 0.8, 1.0),
        ];
        let agg = aggregate(&signals).unwrap();
        // (2*2*0.9 - 1*1*0.5 + 1*1*0.8) / 4 = 3.9 / 4
        assert!((agg.score - 0.975).abs() < 1e-12);
        assert_eq!(agg.action, SignalAction::Buy);
        // (0.9*2 + 0.5 + 0.8) / 4
        assert!((agg.confidence - 0.775).abs() < 1e-12);
        assert_eq!(agg.contributing_signals.len(), 3);
        assert!(agg.rationale.starts_with("score=+0.9750 -> buy from 3 signal(s)"));
    }

    // Half-away-from-zero at every bucket boundary, exactly representable scores.
    #[rstest]
    #[case(SignalAction::Buy, 0.5, SignalAction::Buy)] // score 0.5
    #[case(SignalAction::Sell, 0.5, SignalAction::Sell)] // score -0.5
    #[case(SignalAction::Buy, 0.25, SignalAction::Hold)] // score 0.25
    #[case(SignalAction::StrongBuy, 0.75, SignalAction::StrongBuy)] // score 1.5
    #[case(SignalAction::StrongSell, 0.75, SignalAction::StrongSell)] // score -1.5
    #[case(SignalAction::StrongBuy, 0.625, SignalAction::Buy)] // score 1.25
    fn test_rounding_boundaries(
        #[case] action: SignalAction,
        #[case] confidence: f64,
        #[case] expected: SignalAction,
    ) {
        let agg = aggregate(&[sig(SignalSource::Technical, action, confidence, 1.0)]).unwrap();
        assert_eq!(agg.action, expected, "score {}", agg.score);
    }

    #[test]
    fn test_rejects_non_positive_weight() {
        let signals = vec![
            sig(SignalSource::Technical, SignalAction::Buy, 0.9, 1.0),
            sig(SignalSource::Sentiment, SignalAction::Buy, 0.9, 0.0),
        ];
        assert_matches!(aggregate(&signals), Err(Error::InvalidWeight { weight, .. }) if weight == 0.0);

        let negative = vec![sig(SignalSource::Sentiment, SignalAction::Buy, 0.9, -1.0)];
        assert_matches!(aggregate(&negative), Err(Error::InvalidWeight { .. }));
    }

    #[test]
    fn test_rejects_bad_confidence_and_empty() {
        let signals = vec![sig(SignalSource::Technical, SignalAction::Buy, 1.2, 1.0)];
        assert_matches!(aggregate(&signals), Err(Error::InvalidProbability { .. }));
        assert_matches!(aggregate(&[]), Err(Error::NoSignals(_)));
    }

    #[test]
    fn test_rejects_mixed_symbols() {
        let mut other = sig(SignalSource::Technical, SignalAction::Buy, 0.5, 1.0);
        other.symbol = "AMD".to_string();
        let signals = vec![sig(SignalSource::Technical, SignalAction::Buy, 0.5, 1.0), other];
        assert_matches!(aggregate(&signals), Err(Error::SymbolMismatch { .. }));
    }

    #[test]
    fn test_source_multipliers() {
        let weights = SourceWeights { sentiment: 3.0, ..SourceWeights::default() };
        let agg = SignalAggregator::new(weights)
            .aggregate(&[
                sig(SignalSource::Technical, SignalAction::Buy, 1.0, 1.0),
                sig(SignalSource::Sentiment, SignalAction::Sell, 1.0, 1.0),
            ])
            .unwrap();
        // (1 - 3) / 4
        assert!((agg.score + 0.5).abs() < 1e-12);
        assert_eq!(agg.action, SignalAction::Sell);
    }

    #[test]
    fn test_aggregate_by_symbol_isolates_failures() {
        let mut bad = sig(SignalSource::Technical, SignalAction::Buy, 0.5, -2.0);
        bad.symbol = "TSLA".to_string();
        let signals = vec![sig(SignalSource::Technical, SignalAction::Buy, 0.9, 1.0), bad];
        let out = SignalAggregator::default().aggregate_by_symbol(&signals);
        assert_eq!(out.len(), 2);
        assert!(out["NVDA"].is_ok());
        assert_matches!(out["TSLA"], Err(Error::InvalidWeight { .. }));
    }
}
