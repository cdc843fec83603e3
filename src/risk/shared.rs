//! Async handle that serializes access to a [`RiskGovernor`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::{DynamicRiskManager, PerformanceWindow, RiskGovernor, RiskLimits, TradeOutcome};
use crate::config::RiskConfig;

/// Cloneable handle; every clone points at the same governor.
#[derive(Debug, Clone)]
pub struct SharedRiskManager {
    inner: Arc<Mutex<Box<dyn RiskGovernor>>>,
}

impl SharedRiskManager {
    pub fn new(governor: Box<dyn RiskGovernor>) -> Self {
        Self { inner: Arc::new(Mutex::new(governor)) }
    }

    /// Shared handle around a [`DynamicRiskManager`].
    pub fn dynamic(config: RiskConfig) -> Self {
        Self::new(Box::new(DynamicRiskManager::new(config)))
    }

    #[instrument(skip(self, trade), fields(symbol = %trade.symbol, return_pct = trade.return_pct))]
    pub async fn record_outcome(&self, trade: TradeOutcome) -> RiskLimits {
        let mut governor = self.inner.lock().await;
        let limits = governor.record_outcome(trade);
        info!(state = %limits.state, max_position = limits.max_position_fraction, "trade recorded");
        limits
    }

    /// Limits snapshot for a cycle starting at `now`.
    #[instrument(skip(self))]
    pub async fn snapshot(&self, now: DateTime<Utc>) -> RiskLimits {
        self.inner.lock().await.limits_at(now)
    }

    /// Copy of the trailing window, e.g. for persistence.
    pub async fn window(&self) -> PerformanceWindow {
        self.inner.lock().await.window().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskState;
    use chrono::{Duration, TimeZone};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_are_serialized() {
        let shared = SharedRiskManager::dynamic(RiskConfig { window_size: 50, ..RiskConfig::default() });
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let mut handles = Vec::new();
        for i in 0..40i64 {
            let handle = shared.clone();
            handles.push(tokio::spawn(async move {
                handle.record_outcome(TradeOutcome::new("QQQ", 0.01, start + Duration::minutes(i))).await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let window = shared.window().await;
        assert_eq!(window.len(), 40);
        assert_eq!(window.current_streak(), 40);
        assert_eq!(shared.snapshot(start).await.state, RiskState::Normal);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = SharedRiskManager::dynamic(RiskConfig::default());
        let b = a.clone();
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        for i in 0..3 {
            a.record_outcome(TradeOutcome::new("IWM", -0.02, t + Duration::hours(i))).await;
        }
        assert!(b.snapshot(t + Duration::hours(3)).await.is_cooldown());
    }
}
