//! Multivariate anomaly detector (C3): univariate z-scores + Mahalanobis
//! distance + isolation-forest consensus over the feature vectors C2
//! accumulates.

mod isolation_forest;
mod mahalanobis;

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::stats::StatisticalKernel;

pub use isolation_forest::IsolationForest;
pub use mahalanobis::CovarianceEstimator;

pub const FEATURE_NAMES: [&str; 6] = ["volume", "depth", "spread", "imbalance", "micro_price", "volatility"];
const FEATURE_COUNT: usize = FEATURE_NAMES.len();
const COVARIANCE_WINDOW: usize = 200;
const COVARIANCE_UPDATE_EVERY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnomalySeverity {
    Single,
    MultiFeature,
    Multivariate,
    Systemic,
}

#[derive(Debug, Clone)]
pub struct AnomalyResult {
    pub consensus: f64,
    pub is_anomalous: bool,
    pub severity: AnomalySeverity,
    pub univariate: f64,
    pub mahalanobis_norm: f64,
    pub isolation: f64,
    pub triggered_features: Vec<&'static str>,
    pub explanation: String,
    pub remediation: Vec<&'static str>,
}

struct MarketState {
    history: Vec<[f64; FEATURE_COUNT]>,
    covariance: CovarianceEstimator,
    points_since_update: usize,
}

impl MarketState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            covariance: CovarianceEstimator::new(FEATURE_COUNT),
            points_since_update: 0,
        }
    }
}

pub struct AnomalyDetector {
    kernel: std::sync::Arc<StatisticalKernel>,
    forest: IsolationForest,
    consensus_threshold: f64,
    markets: RwLock<HashMap<String, MarketState>>,
}

impl AnomalyDetector {
    pub fn new(kernel: std::sync::Arc<StatisticalKernel>, consensus_threshold: f64) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(0xA17A_u64);
        Self {
            kernel,
            forest: IsolationForest::new(100, 256, rng),
            consensus_threshold,
            markets: RwLock::new(HashMap::new()),
        }
    }

    /// Feed one new feature vector for `market_id` and produce the
    /// consensus anomaly verdict. `features` must be ordered per
    /// `FEATURE_NAMES`.
    pub fn observe(&self, market_id: &str, features: [f64; FEATURE_COUNT]) -> AnomalyResult {
        for (name, value) in FEATURE_NAMES.iter().zip(features.iter()) {
            self.kernel.add_data_point(market_id, name, *value);
        }

        let mut markets = self.markets.write();
        let state = markets.entry(market_id.to_string()).or_insert_with(MarketState::new);
        state.history.push(features);
        if state.history.len() > COVARIANCE_WINDOW {
            state.history.remove(0);
        }
        state.points_since_update += 1;
        if state.points_since_update >= COVARIANCE_UPDATE_EVERY && state.history.len() >= FEATURE_COUNT + 1 {
            state.covariance.fit(&state.history);
            state.points_since_update = 0;
        }

        let mut z_scores = Vec::with_capacity(FEATURE_COUNT);
        let mut triggered = Vec::new();
        for (name, value) in FEATURE_NAMES.iter().zip(features.iter()) {
            let z = self.kernel.z_score(market_id, name, *value);
            if z.is_anomaly {
                triggered.push(*name);
            }
            z_scores.push(z.z.abs());
        }
        let univariate = (z_scores.iter().sum::<f64>() / FEATURE_COUNT as f64 / 4.0).clamp(0.0, 1.0);

        let mahalanobis = state.covariance.distance(&features);
        let mahalanobis_norm = (mahalanobis / 10.0).clamp(0.0, 1.0);

        let isolation = if state.history.len() >= 10 {
            self.forest.anomaly_score(&state.history, &features)
        } else {
            0.0
        };

        let consensus = 0.4 * univariate + 0.35 * mahalanobis_norm + 0.25 * isolation;
        let is_anomalous = consensus > self.consensus_threshold;

        let severity = severity_of(triggered.len(), mahalanobis_norm, isolation);
        let explanation = explain(&triggered, mahalanobis_norm, isolation, consensus);
        let remediation = remediation_for(severity, &triggered);

        AnomalyResult {
            consensus,
            is_anomalous,
            severity,
            univariate,
            mahalanobis_norm,
            isolation,
            triggered_features: triggered,
            explanation,
            remediation,
        }
    }
}

fn severity_of(triggered_count: usize, mahalanobis_norm: f64, isolation: f64) -> AnomalySeverity {
    if triggered_count >= 3 {
        AnomalySeverity::Systemic
    } else if mahalanobis_norm > 0.7 && isolation > 0.6 {
        AnomalySeverity::Multivariate
    } else if triggered_count >= 2 {
        AnomalySeverity::MultiFeature
    } else {
        AnomalySeverity::Single
    }
}

fn explain(triggered: &[&'static str], mahalanobis_norm: f64, isolation: f64, consensus: f64) -> String {
    if triggered.is_empty() && consensus < 0.3 {
        return "no anomalous features detected".to_string();
    }
    let feature_list = if triggered.is_empty() {
        "no single feature crossed its z-score threshold".to_string()
    } else {
        format!("features {} crossed their z-score thresholds", triggered.join(", "))
    };
    format!(
        "{feature_list}; mahalanobis_norm={mahalanobis_norm:.2}, isolation={isolation:.2}, consensus={consensus:.2}"
    )
}

fn remediation_for(severity: AnomalySeverity, triggered: &[&'static str]) -> Vec<&'static str> {
    let mut hints = Vec::new();
    match severity {
        AnomalySeverity::Systemic => {
            hints.push("treat as a market-wide event, check for news or outage");
            hints.push("widen dedup window to avoid alert storms");
        }
        AnomalySeverity::Multivariate => {
            hints.push("cross-check against correlated markets before acting");
        }
        AnomalySeverity::MultiFeature => {
            hints.push("confirm with order-book snapshot before escalating");
        }
        AnomalySeverity::Single => {
            hints.push("monitor for a second corroborating feature");
        }
    }
    if triggered.contains(&"spread") {
        hints.push("check for a liquidity vacuum before trusting the price move");
    }
    hints.truncate(4);
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_features(v: f64) -> [f64; FEATURE_COUNT] {
        [v, 100.0, 10.0, 0.0, 0.5, 0.1]
    }

    #[test]
    fn stable_series_stays_non_anomalous() {
        let kernel = std::sync::Arc::new(StatisticalKernel::new(200, 30));
        let detector = AnomalyDetector::new(kernel, 0.6);
        let mut last = AnomalyResult {
            consensus: 1.0,
            is_anomalous: true,
            severity: AnomalySeverity::Single,
            univariate: 0.0,
            mahalanobis_norm: 0.0,
            isolation: 0.0,
            triggered_features: vec![],
            explanation: String::new(),
            remediation: vec![],
        };
        for _ in 0..60 {
            last = detector.observe("m1", baseline_features(100.0));
        }
        assert!(!last.is_anomalous, "consensus={}", last.consensus);
    }

    #[test]
    fn severity_escalates_to_systemic_with_three_triggers() {
        assert_eq!(severity_of(3, 0.1, 0.1), AnomalySeverity::Systemic);
        assert_eq!(severity_of(1, 0.1, 0.1), AnomalySeverity::Single);
    }
}
