//! Front-running scorer (C7): scores a market's microstructure footprint
//! for signs of informed trading ahead of news, with a validation hook
//! that feeds realized accuracy back into future scores.

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use parking_lot::Mutex;

use crate::microstructure::EnhancedMicrostructureMetrics;
use crate::models::{Market, Severity, Signal, SignalPayload};

const SPREAD_EPSILON: f64 = 1.0;
const BASE_TIME_TO_NEWS_MINUTES: f64 = 5.0;
const VALIDATION_WINDOW_HOURS: i64 = 2;
const EMIT_THRESHOLD: f64 = 0.5;

struct UnvalidatedEvent {
    market_id: String,
    scored_at: DateTime<Utc>,
    leak_probability: f64,
}

struct AccuracyTracker {
    pending: Vec<UnvalidatedEvent>,
    /// running multiplier in (0, 2], applied to future leak probabilities.
    historical_accuracy: f64,
    validated_count: u64,
    total_count: u64,
}

impl AccuracyTracker {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            historical_accuracy: 1.0,
            validated_count: 0,
            total_count: 0,
        }
    }
}

pub struct FrontRunScorer {
    tracker: Mutex<AccuracyTracker>,
}

#[derive(Debug, Clone)]
pub struct FrontRunScore {
    pub raw: f64,
    pub score: f64,
    pub confidence: f64,
    pub leak_probability: f64,
    pub time_to_news_minutes: f64,
}

impl FrontRunScorer {
    pub fn new() -> Self {
        Self {
            tracker: Mutex::new(AccuracyTracker::new()),
        }
    }

    pub fn score(
        &self,
        metrics: &EnhancedMicrostructureMetrics,
        market: &Market,
        z_volume: f64,
        any_depth_or_imbalance_z_above_2: bool,
        correlated_count: usize,
        now: DateTime<Utc>,
    ) -> (FrontRunScore, Option<Signal>) {
        let volume_weight = z_volume.max(1.0) * (market.volume.max(1000.0).log10() / 6.0);
        let spread_floor = metrics.spread_bps.max(SPREAD_EPSILON);

        let raw = (metrics.micro_price_drift.abs() * volume_weight * metrics.depth_change_pct.abs()) / spread_floor;

        let mut bonus = 1.0;
        if metrics.spread_change_pct.abs() < 0.10 && any_depth_or_imbalance_z_above_2 {
            bonus *= 1.2;
        }
        let cross_market_bonus = (1.0 + 0.5 * (correlated_count.min(5) as f64 / 5.0)).clamp(1.0, 1.5);
        bonus *= cross_market_bonus;

        let hour = now.hour();
        let off_hours = hour >= 22 || hour <= 5;
        if off_hours {
            bonus *= 2.0;
        }

        let score = (raw * bonus / 10.0).tanh();

        let confidence = {
            let microstructure_strength = (metrics.micro_price_drift.abs() / (metrics.depth_baseline.max(1.0))).clamp(0.0, 1.0);
            let z_magnitude = (z_volume.abs() / 4.0).clamp(0.0, 1.0);
            let cross_market = (correlated_count as f64 / 5.0).clamp(0.0, 1.0);
            ((microstructure_strength + z_magnitude + cross_market) / 3.0).clamp(0.0, 1.0)
        };

        let accuracy_multiplier = self.tracker.lock().historical_accuracy;
        let leak_probability = (0.7 * score + 0.2 * confidence + (bonus - 1.0) * 0.1) * accuracy_multiplier;
        let leak_probability = leak_probability.clamp(0.0, 1.0);

        let time_to_news_minutes = (BASE_TIME_TO_NEWS_MINUTES * (1.0 - score) / bonus.max(1.0)).clamp(1.0, 30.0);

        let result = FrontRunScore {
            raw,
            score,
            confidence,
            leak_probability,
            time_to_news_minutes,
        };

        let signal = if score >= EMIT_THRESHOLD {
            {
                let mut tracker = self.tracker.lock();
                tracker.pending.push(UnvalidatedEvent {
                    market_id: market.market_id.clone(),
                    scored_at: now,
                    leak_probability,
                });
                tracker.total_count += 1;
            }

            let severity = if score >= 0.9 {
                Severity::Critical
            } else if score >= 0.8 {
                Severity::High
            } else {
                Severity::Medium
            };

            Some(Signal::new(
                market.market_id.clone(),
                market.question.clone(),
                confidence,
                SignalPayload::FrontRunning {
                    score,
                    leak_probability,
                    time_to_news_minutes,
                    severity,
                },
            ))
        } else {
            None
        };

        (result, signal)
    }

    /// Marks any unvalidated event for `market_id` within the last
    /// `VALIDATION_WINDOW_HOURS` as validated, records its lead time, and
    /// updates the running accuracy multiplier fed into future scores.
    pub fn validate_leak_event(&self, market_id: &str, news_time: DateTime<Utc>) -> Vec<chrono::Duration> {
        let mut tracker = self.tracker.lock();
        let window_start = news_time - chrono::Duration::hours(VALIDATION_WINDOW_HOURS);

        let mut lead_times = Vec::new();
        let mut remaining = Vec::new();
        for event in tracker.pending.drain(..) {
            if event.market_id == market_id && event.scored_at >= window_start && event.scored_at <= news_time {
                lead_times.push(news_time - event.scored_at);
                tracker.validated_count += 1;
            } else {
                remaining.push(event);
            }
        }
        tracker.pending = remaining;

        if tracker.total_count > 0 {
            tracker.historical_accuracy = (tracker.validated_count as f64 / tracker.total_count as f64 * 2.0).clamp(0.1, 2.0);
        }

        lead_times
    }
}

impl Default for FrontRunScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, volume: f64) -> Market {
        Market::new(id, "q", "d", vec!["Yes".into(), "No".into()], vec![0.5, 0.5], volume)
    }

    fn metrics(drift: f64, depth_change: f64, spread_bps: f64) -> EnhancedMicrostructureMetrics {
        EnhancedMicrostructureMetrics {
            market_id: "m1".into(),
            depth: 100.0,
            depth_change_pct: depth_change,
            depth_baseline: 100.0,
            micro_price: 0.5,
            micro_price_slope: 0.0,
            micro_price_drift: drift,
            imbalance: 0.0,
            spread_bps,
            spread_change_pct: 0.05,
            liquidity_vacuum: false,
            z_scores: vec![],
        }
    }

    #[test]
    fn high_drift_low_spread_scores_above_emit_threshold() {
        let scorer = FrontRunScorer::new();
        let m = metrics(0.05, 0.8, 2.0);
        let market = market("m1", 50_000.0);
        let noon = Utc::now().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        let (result, signal) = scorer.score(&m, &market, 4.0, true, 2, noon);
        assert!(result.score > 0.0);
        if result.score >= 0.5 {
            assert!(signal.is_some());
        }
    }

    #[test]
    fn validation_updates_historical_accuracy() {
        let scorer = FrontRunScorer::new();
        let m = metrics(0.1, 0.9, 1.0);
        let market = market("m1", 100_000.0);
        let now = Utc::now();
        let (_, signal) = scorer.score(&m, &market, 5.0, true, 3, now);
        assert!(signal.is_some());

        let lead_times = scorer.validate_leak_event("m1", now + chrono::Duration::minutes(10));
        assert_eq!(lead_times.len(), 1);
    }

    #[test]
    fn time_to_news_stays_within_bounds() {
        let scorer = FrontRunScorer::new();
        let m = metrics(0.001, 0.01, 500.0);
        let market = market("m1", 1_000.0);
        let (result, _) = scorer.score(&m, &market, 0.0, false, 0, Utc::now());
        assert!(result.time_to_news_minutes >= 1.0 && result.time_to_news_minutes <= 30.0);
    }
}
