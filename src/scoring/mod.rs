//! Opportunity scorer (C9): four-axis 0..100 composite score.

use chrono::{DateTime, Utc};

use crate::categorize::VolumeThresholds;
use crate::config::OpportunityWeights;
use crate::models::Market;

#[derive(Debug, Clone, Copy)]
pub struct ScoringParams {
    pub optimal_volume_multiplier: f64,
    pub illiquidity_penalty_threshold: f64,
    pub efficiency_penalty_threshold: f64,
    pub optimal_days_to_close: f64,
    pub min_days_to_close: f64,
    pub max_days_to_close: f64,
    pub optimal_spread_bps: f64,
    pub max_age_days: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            optimal_volume_multiplier: 4.0,
            illiquidity_penalty_threshold: 0.5,
            efficiency_penalty_threshold: 20.0,
            optimal_days_to_close: 14.0,
            min_days_to_close: 1.0,
            max_days_to_close: 180.0,
            optimal_spread_bps: 150.0,
            max_age_days: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreBreakdown {
    pub volume_score: f64,
    pub edge_score: f64,
    pub catalyst_score: f64,
    pub quality_score: f64,
    pub total: f64,
}

pub struct OpportunityScorer {
    params: ScoringParams,
}

impl OpportunityScorer {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    pub fn score(
        &self,
        market: &Market,
        weights: &OpportunityWeights,
        thresholds: &VolumeThresholds,
        spread_bps: f64,
        listed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let threshold = thresholds.threshold_for(market.category.as_deref());

        let volume_score = self.volume_score(market.volume, threshold);
        let edge_score = self.edge_score(market);
        let catalyst_score = self.catalyst_score(market, now);
        let quality_score = self.quality_score(spread_bps, listed_at, now);

        let total = (weights.volume * volume_score
            + weights.edge * edge_score
            + weights.catalyst * catalyst_score
            + weights.quality * quality_score)
            .clamp(0.0, 100.0);

        ScoreBreakdown {
            volume_score,
            edge_score,
            catalyst_score,
            quality_score,
            total,
        }
    }

    fn volume_score(&self, volume: f64, threshold: f64) -> f64 {
        if threshold <= 0.0 {
            return 0.0;
        }
        let p = &self.params;
        let ratio = volume / threshold;
        let optimal = p.optimal_volume_multiplier;

        if ratio < p.illiquidity_penalty_threshold {
            30.0 * (ratio / p.illiquidity_penalty_threshold).clamp(0.0, 1.0) * 0.5
        } else if ratio > p.efficiency_penalty_threshold {
            (30.0 * (p.efficiency_penalty_threshold / ratio)).clamp(0.0, 30.0)
        } else {
            let distance = (ratio - optimal).abs();
            let spread = optimal.max(1.0);
            (30.0 * (1.0 - (distance / spread).min(1.0))).clamp(0.0, 30.0)
        }
    }

    fn edge_score(&self, market: &Market) -> f64 {
        let category_multiplier: f64 = match market.category.as_deref() {
            Some("politics") => 1.2,
            Some("economics") => 1.15,
            Some("crypto") => 0.9,
            Some("sports") => 1.0,
            Some("entertainment") => 0.85,
            _ => 1.0,
        };
        let base = (market.category_score as f64 * category_multiplier).min(20.0);
        let outcome_bonus = if market.outcomes.len() > 5 {
            5.0_f64.min((market.outcomes.len() - 5) as f64)
        } else {
            0.0
        };
        (base + outcome_bonus).clamp(0.0, 25.0)
    }

    fn catalyst_score(&self, market: &Market, now: DateTime<Utc>) -> f64 {
        let p = &self.params;
        let Some(days_to_close) = market.time_to_close(now).map(|d| d.num_seconds() as f64 / 86_400.0) else {
            return 0.0;
        };
        if days_to_close < p.min_days_to_close || days_to_close > p.max_days_to_close {
            return 0.0;
        }

        let distance = (days_to_close - p.optimal_days_to_close).abs();
        let spread = p.optimal_days_to_close.max(1.0);
        let mut score = 25.0 * (1.0 - (distance / spread).min(1.0));

        if days_to_close <= 7.0 {
            score *= 1.5;
        }
        score.clamp(0.0, 25.0)
    }

    fn quality_score(&self, spread_bps: f64, listed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let p = &self.params;

        let spread_component = {
            let distance = (spread_bps - p.optimal_spread_bps).abs();
            (1.0 - (distance / p.optimal_spread_bps.max(1.0)).min(1.0)) * 8.0
        };

        let age_component = match listed_at {
            Some(listed) => {
                let age_days = (now - listed).num_seconds() as f64 / 86_400.0;
                if age_days <= 0.0 || age_days > p.max_age_days {
                    0.0
                } else {
                    (1.0 - (age_days / p.max_age_days)) * 6.0
                }
            }
            None => 3.0,
        };

        let liquidity_component = (spread_bps.recip().min(1.0)) * 6.0;

        (spread_component + age_component + liquidity_component).clamp(0.0, 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(category: Option<&str>, category_score: u32, volume: f64, end_in_days: i64) -> Market {
        let mut m = Market::new("m1", "q", "d", vec!["Yes".into(), "No".into()], vec![0.5, 0.5], volume);
        m.category = category.map(|s| s.to_string());
        m.category_score = category_score;
        m.end_date = Some(Utc::now() + chrono::Duration::days(end_in_days));
        m
    }

    #[test]
    fn total_score_stays_within_bounds() {
        let scorer = OpportunityScorer::new(ScoringParams::default());
        let weights = OpportunityWeights::default();
        let thresholds = VolumeThresholds::default();
        let m = market(Some("politics"), 3, 40_000.0, 14);
        let breakdown = scorer.score(&m, &weights, &thresholds, 150.0, None, Utc::now());
        assert!(breakdown.total >= 0.0 && breakdown.total <= 100.0);
    }

    #[test]
    fn catalyst_score_zero_outside_window() {
        let scorer = OpportunityScorer::new(ScoringParams::default());
        let m = market(Some("politics"), 3, 40_000.0, 400);
        assert_eq!(scorer.catalyst_score(&m, Utc::now()), 0.0);
    }

    #[test]
    fn urgency_multiplier_boosts_near_close() {
        let scorer = OpportunityScorer::new(ScoringParams::default());
        let near = market(Some("politics"), 3, 40_000.0, 5);
        let far = market(Some("politics"), 3, 40_000.0, 14);
        let near_score = scorer.catalyst_score(&near, Utc::now());
        let far_score = scorer.catalyst_score(&far, Utc::now());
        assert!(near_score > 0.0 && far_score > 0.0);
    }
}
