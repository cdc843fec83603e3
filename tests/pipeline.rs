use chrono::{Duration, TimeZone, Utc};
use position_advisor::analysis::ExpectedValueCalculator;
use position_advisor::config::ExpectedValueConfig;
use position_advisor::{
    AdvisorConfig, AdvisorEngine, Error, EvResult, EvTier, KellyOptimizer, RecommendationComposer, ReturnDistribution,
    RiskLimits, Scenario, ScenarioSet, SignalAction, SignalAggregator, SignalSource, SymbolInput, SymbolSignal,
};

fn signals(symbol: &str) -> Vec<SymbolSignal> {
    let base = Utc.with_ymd_and_hms(2024, 4, 15, 14, 0, 0).unwrap();
    vec![
        SymbolSignal::new(symbol, SignalSource::Technical, SignalAction::Buy, 0.71, 1.3, base),
        SymbolSignal::new(symbol, SignalSource::Sentiment, SignalAction::StrongBuy, 0.33, 0.7, base + Duration::minutes(3)),
        SymbolSignal::new(symbol, SignalSource::Institutional, SignalAction::Sell, 0.58, 1.1, base),
        SymbolSignal::new(symbol, SignalSource::GovernmentContract, SignalAction::Buy, 0.91, 0.2, base),
        SymbolSignal::new(symbol, SignalSource::Fundamental, SignalAction::StrongBuy, 0.47, 2.9, base + Duration::seconds(1)),
        SymbolSignal::new(symbol, SignalSource::Technical, SignalAction::StrongBuy, 0.12, 0.3, base + Duration::hours(1)),
    ]
}

/// Deterministic mildly positive daily series.
fn history(n: usize) -> Vec<f64> {
    (0..n).map(|i| [0.012, -0.006, 0.009, 0.004, -0.011, 0.015, -0.002][i % 7]).collect()
}

#[test]
fn aggregation_is_order_independent() -> anyhow::Result<()> {
    let aggregator = SignalAggregator::default();
    let forward = signals("AAPL");
    let expected = aggregator.aggregate(&forward)?;

    let mut reversed = forward.clone();
    reversed.reverse();
    assert_eq!(aggregator.aggregate(&reversed)?, expected);

    for shift in 1..forward.len() {
        let mut rotated = forward.clone();
        rotated.rotate_left(shift);
        let got = aggregator.aggregate(&rotated)?;
        assert_eq!(got.score.to_bits(), expected.score.to_bits());
        assert_eq!(got.confidence.to_bits(), expected.confidence.to_bits());
        assert_eq!(got, expected);
    }
    Ok(())
}

#[test]
fn scenario_probabilities_must_sum_to_one() {
    let res = ScenarioSet::new(vec![
        Scenario::new("bull", 0.3, 0.08),
        Scenario::new("base", 0.4, 0.02),
        Scenario::new("bear", 0.2, -0.05),
    ]);
    assert!(matches!(res, Err(Error::InvalidProbability { value, .. }) if (value - 0.9).abs() < 1e-9));
}

#[test]
fn reference_kelly_sizing() -> anyhow::Result<()> {
    let optimizer = KellyOptimizer::default();
    let r = optimizer.optimize("AAPL", 0.561, 0.05, 0.03, 0.5)?;
    assert!((r.raw_kelly_fraction - 0.2976).abs() < 1e-4);
    assert!((r.conservative_fraction - 0.1488).abs() < 1e-4);
    assert!(r.conservative_fraction <= 0.15);

    // carried through the composer under a 0.15 per-position cap
    let agg = SignalAggregator::default().aggregate(&signals("AAPL"))?;
    assert!(agg.action.is_buy_side());
    let ev = EvResult {
        symbol: "AAPL".to_string(),
        expected_value: 0.021,
        risk_adjusted_ev: 0.09,
        probability_of_loss: 0.3,
        var_95: -0.028,
        cvar_95: -0.035,
        sharpe: 1.4,
        sortino: 2.1,
        tier: EvTier::Strong,
        numeric_flags: Vec::new(),
    };
    let rec = RecommendationComposer::default().compose(&agg, &ev, &r, &RiskLimits::normal(0.15, 0.5));
    assert_eq!(rec.action, agg.action);
    assert!((rec.position_fraction - 0.1488).abs() < 1e-4);
    assert_eq!(rec.position_fraction, r.conservative_fraction);
    Ok(())
}

#[test]
fn composed_recommendation_is_reproducible_and_capped() -> anyhow::Result<()> {
    let dist = ReturnDistribution::from_returns("AAPL", "1d", history(60));
    let calculator = ExpectedValueCalculator::new(ExpectedValueConfig::default());
    let ev = calculator.evaluate(&dist, &calculator.canonical_scenarios(&dist)?)?;
    let agg = SignalAggregator::default().aggregate(&signals("AAPL"))?;
    let kelly = KellyOptimizer::default().optimize_default("AAPL", dist.win_rate, dist.avg_gain, dist.avg_loss)?;
    let composer = RecommendationComposer::default();

    for limits in [RiskLimits::normal(0.15, 0.5), RiskLimits::normal(0.02, 0.5), RiskLimits::normal(0.0, 0.0)] {
        let a = composer.compose(&agg, &ev, &kelly, &limits);
        let b = composer.compose(&agg, &ev, &kelly, &limits);
        assert_eq!(a, b);
        assert!(a.position_fraction >= 0.0);
        assert!(a.position_fraction <= limits.max_position_fraction);
    }
    Ok(())
}

#[test]
fn full_cycle_end_to_end() -> anyhow::Result<()> {
    let config = AdvisorConfig::default();
    config.init_logging();
    let engine = AdvisorEngine::new(config);
    let mut broken = signals("TSLA");
    broken[2].confidence = 1.5;
    let inputs = vec![
        SymbolInput::new("MSFT", signals("MSFT"), ReturnDistribution::from_returns("MSFT", "1d", history(80))),
        SymbolInput::new("TSLA", broken, ReturnDistribution::from_returns("TSLA", "1d", history(80))),
        SymbolInput::new("NEW", signals("NEW"), ReturnDistribution::from_returns("NEW", "1d", history(7))),
        SymbolInput::new("AAPL", signals("AAPL"), ReturnDistribution::from_returns("AAPL", "1d", history(80)))
            .with_scenarios(ScenarioSet::new(vec![
                Scenario::new("up", 0.6, 0.04),
                Scenario::new("down", 0.4, -0.08),
            ])?),
    ];
    let limits = RiskLimits::normal(0.15, 0.5);
    let report = engine.run_cycle(inputs, &limits);

    let symbols: Vec<&str> = report.recommendations.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "MSFT", "NEW"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "TSLA");
    assert_eq!(report.failures[0].kind, "invalid_probability");

    let new = report.recommendation("NEW").expect("degraded recommendation");
    assert_eq!(new.action, SignalAction::Hold);
    assert_eq!(new.confidence, 0.0);

    // EV of -0.008 lands in the avoid tier
    let aapl = report.recommendation("AAPL").expect("aapl");
    assert_eq!(aapl.risk_tier, EvTier::Avoid);
    assert!(!aapl.action.is_buy_side());

    for rec in &report.recommendations {
        assert!(rec.position_fraction <= limits.max_position_fraction);
    }
    assert!(report.total_buy_fraction() <= limits.max_portfolio_risk_fraction + 1e-12);

    let json = serde_json::to_string(&report)?;
    let back: position_advisor::CycleReport = serde_json::from_str(&json)?;
    assert_eq!(back.recommendations.len(), report.recommendations.len());
    assert_eq!(back.risk_limits, limits);
    Ok(())
}

#[test]
fn cooldown_limits_turn_buys_into_holds() {
    position_advisor::utils::init_test_logging();
    let engine = AdvisorEngine::default();
    let until = Utc.with_ymd_and_hms(2024, 4, 17, 0, 0, 0).unwrap();
    let inputs = vec![SymbolInput::new(
        "MSFT",
        signals("MSFT"),
        ReturnDistribution::from_returns("MSFT", "1d", history(80)),
    )];
    let report = engine.run_cycle(inputs, &RiskLimits::cooldown(until));
    let rec = &report.recommendations[0];
    assert_eq!(rec.position_fraction, 0.0);
    assert_eq!(rec.dollar_amount, 0.0);
    assert!(report.allocations.is_empty());
}
