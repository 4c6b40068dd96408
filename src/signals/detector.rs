//! Signal Detection Engine
//! Mission: surface volume spikes, price movement, new-market activity and
//! general activity surges from periodic market snapshots.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::ConfigSnapshot;
use crate::models::{Market, MarketSnapshot, Signal, SignalPayload};

/// One sliding window's worth of per-market dedup state: a detector fires
/// at most once per market per window.
#[derive(Default)]
struct DedupWindow {
    fired: HashSet<(String, &'static str)>,
    window_start: Option<DateTime<Utc>>,
}

pub struct SignalDetector {
    dedup: std::sync::Mutex<DedupWindow>,
    window: chrono::Duration,
}

impl SignalDetector {
    pub fn new(window: chrono::Duration) -> Self {
        Self {
            dedup: std::sync::Mutex::new(DedupWindow::default()),
            window,
        }
    }

    /// Detect all four signal families across the current market list.
    /// History entries that fail to parse are skipped; the pass never
    /// aborts on a single corrupted entry.
    pub fn detect_all(
        &self,
        markets: &[Market],
        history: &HashMap<String, Vec<MarketSnapshot>>,
        cfg: &ConfigSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        self.roll_window(now);

        if markets.is_empty() {
            return Vec::new();
        }

        let mut signals = Vec::with_capacity(markets.len());
        for market in markets {
            let snapshots = history.get(&market.market_id);

            if let Some(sig) = self.detect_volume_spike(market, snapshots, cfg) {
                signals.push(sig);
            }
            if let Some(sig) = self.detect_price_movement(market, snapshots, cfg) {
                signals.push(sig);
            }
            if let Some(sig) = self.detect_new_market(market, snapshots, cfg) {
                signals.push(sig);
            }
            if let Some(sig) = self.detect_activity(market, snapshots, cfg) {
                signals.push(sig);
            }
        }
        signals
    }

    fn roll_window(&self, now: DateTime<Utc>) {
        let mut dedup = self.dedup.lock().unwrap();
        let expired = match dedup.window_start {
            Some(start) => now - start > self.window,
            None => true,
        };
        if expired {
            dedup.fired.clear();
            dedup.window_start = Some(now);
        }
    }

    fn claim(&self, market_id: &str, kind: &'static str) -> bool {
        let mut dedup = self.dedup.lock().unwrap();
        dedup.fired.insert((market_id.to_string(), kind))
    }

    fn detect_volume_spike(
        &self,
        market: &Market,
        snapshots: Option<&Vec<MarketSnapshot>>,
        cfg: &ConfigSnapshot,
    ) -> Option<Signal> {
        let snapshots = snapshots?;
        if snapshots.len() < 2 {
            return None;
        }
        let prior: Vec<f64> = snapshots[..snapshots.len() - 1]
            .iter()
            .map(|s| s.volume_24h)
            .filter(|v| v.is_finite())
            .collect();
        if prior.is_empty() {
            return None;
        }
        let mean_prior = prior.iter().sum::<f64>() / prior.len() as f64;
        if mean_prior <= 0.0 {
            return None;
        }

        let multiplier = market.volume / mean_prior;
        let threshold = cfg.volume_spike_multiplier;
        let meets_floor = market.volume >= cfg.min_volume_threshold * threshold;

        if multiplier >= threshold && meets_floor {
            if !self.claim(&market.market_id, "volume_spike") {
                return None;
            }
            let confidence = ((multiplier - threshold) / threshold).clamp(0.0, 1.0);
            return Some(Signal::new(
                market.market_id.clone(),
                market.question.clone(),
                confidence,
                SignalPayload::VolumeSpike {
                    current_volume: market.volume,
                    spike_multiplier: multiplier,
                },
            ));
        }
        None
    }

    fn detect_price_movement(
        &self,
        market: &Market,
        snapshots: Option<&Vec<MarketSnapshot>>,
        cfg: &ConfigSnapshot,
    ) -> Option<Signal> {
        let snapshots = snapshots?;
        let latest = snapshots.last()?;

        let mut worst_idx = None;
        let mut worst_change = 0.0_f64;
        for (i, change) in latest.price_change.iter().enumerate() {
            if !change.is_finite() {
                warn!(market_id = %market.market_id, idx = i, "skipping corrupted price_change entry");
                continue;
            }
            if change.abs() > worst_change.abs() {
                worst_change = *change;
                worst_idx = Some(i);
            }
        }

        let outcome_index = worst_idx?;
        if worst_change.abs() < cfg.price_move_threshold_pct {
            return None;
        }
        if !self.claim(&market.market_id, "price_movement") {
            return None;
        }

        let baseline = cfg.baseline_expected_change_pct.max(1e-6);
        let confidence = (worst_change.abs() / (cfg.price_move_threshold_pct + baseline)).clamp(0.0, 1.0);

        Some(Signal::new(
            market.market_id.clone(),
            market.question.clone(),
            confidence,
            SignalPayload::PriceMovement {
                outcome_index,
                price_change_pct: worst_change,
                baseline_expected_pct: cfg.baseline_expected_change_pct,
            },
        ))
    }

    fn detect_new_market(
        &self,
        market: &Market,
        snapshots: Option<&Vec<MarketSnapshot>>,
        cfg: &ConfigSnapshot,
    ) -> Option<Signal> {
        if snapshots.is_some() {
            return None;
        }
        if market.volume < cfg.new_market_activity_threshold {
            return None;
        }
        if !self.claim(&market.market_id, "new_market") {
            return None;
        }
        let activity_score = (market.volume / cfg.new_market_activity_threshold).min(10.0) * 10.0;
        Some(Signal::new(
            market.market_id.clone(),
            market.question.clone(),
            (activity_score / 100.0).clamp(0.0, 1.0),
            SignalPayload::NewMarket { activity_score },
        ))
    }

    fn detect_activity(
        &self,
        market: &Market,
        snapshots: Option<&Vec<MarketSnapshot>>,
        cfg: &ConfigSnapshot,
    ) -> Option<Signal> {
        let latest = snapshots.and_then(|s| s.last())?;
        if !latest.activity_score.is_finite() || latest.activity_score < cfg.activity_threshold {
            return None;
        }
        if !self.claim(&market.market_id, "activity_surge") {
            return None;
        }
        let confidence = (latest.activity_score / 100.0).clamp(0.0, 1.0);
        Some(Signal::new(
            market.market_id.clone(),
            market.question.clone(),
            confidence,
            SignalPayload::ActivitySurge {
                activity_score: latest.activity_score,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, volume: f64) -> Market {
        Market::new(id, "will x happen?", "desc", vec!["Yes".into(), "No".into()], vec![0.5, 0.5], volume)
    }

    fn snapshot(market_id: &str, volume_24h: f64, price_change: Vec<f64>, activity_score: f64) -> MarketSnapshot {
        MarketSnapshot {
            market_id: market_id.into(),
            t: Utc::now(),
            volume_24h,
            prices: vec![0.5, 0.5],
            price_change,
            activity_score,
            volume_change_pct: 0.0,
        }
    }

    #[test]
    fn empty_input_is_idempotent() {
        let detector = SignalDetector::new(chrono::Duration::minutes(15));
        let cfg = ConfigSnapshot::default();
        let signals = detector.detect_all(&[], &HashMap::new(), &cfg, Utc::now());
        assert!(signals.is_empty());
    }

    #[test]
    fn volume_spike_requires_both_multiplier_and_floor() {
        let detector = SignalDetector::new(chrono::Duration::minutes(15));
        let mut cfg = ConfigSnapshot::default();
        cfg.volume_spike_multiplier = 3.0;
        cfg.min_volume_threshold = 1_000.0;

        let m = market("m1", 10_000.0);
        let mut history = HashMap::new();
        history.insert(
            "m1".to_string(),
            vec![
                snapshot("m1", 2_000.0, vec![0.0, 0.0], 0.0),
                snapshot("m1", 2_100.0, vec![0.0, 0.0], 0.0),
            ],
        );

        let signals = detector.detect_all(&[m], &history, &cfg, Utc::now());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type(), "volume_spike");
    }

    #[test]
    fn fires_at_most_once_per_market_per_window() {
        let detector = SignalDetector::new(chrono::Duration::minutes(15));
        let mut cfg = ConfigSnapshot::default();
        cfg.volume_spike_multiplier = 3.0;
        cfg.min_volume_threshold = 1_000.0;

        let m = market("m1", 10_000.0);
        let mut history = HashMap::new();
        history.insert(
            "m1".to_string(),
            vec![snapshot("m1", 2_000.0, vec![0.0, 0.0], 0.0), snapshot("m1", 2_100.0, vec![0.0, 0.0], 0.0)],
        );

        let now = Utc::now();
        let first = detector.detect_all(std::slice::from_ref(&m), &history, &cfg, now);
        let second = detector.detect_all(std::slice::from_ref(&m), &history, &cfg, now);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn new_market_requires_no_history_and_enough_volume() {
        let detector = SignalDetector::new(chrono::Duration::minutes(15));
        let mut cfg = ConfigSnapshot::default();
        cfg.new_market_activity_threshold = 20.0;

        let m = market("m1", 100.0);
        let signals = detector.detect_all(&[m], &HashMap::new(), &cfg, Utc::now());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type(), "new_market");
    }

    #[test]
    fn corrupted_price_change_entry_is_skipped_not_fatal() {
        let detector = SignalDetector::new(chrono::Duration::minutes(15));
        let cfg = ConfigSnapshot::default();

        let m = market("m1", 5_000.0);
        let mut history = HashMap::new();
        history.insert(
            "m1".to_string(),
            vec![snapshot("m1", 5_000.0, vec![f64::NAN, 15.0], 0.0)],
        );

        let signals = detector.detect_all(&[m], &history, &cfg, Utc::now());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type(), "price_movement");
    }
}
