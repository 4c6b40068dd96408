//! Configuration port: snapshot, validation, presets, hot-reload.
//!
//! Config *file* loading is an injected, out-of-scope concern (§1); this
//! module only defines the in-memory snapshot, the validation rules from
//! §6, and the preset table. Environment-variable defaults follow the
//! teacher's `Config::from_env` convention.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::models::Priority;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_per_hour: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut max_per_hour = HashMap::new();
        max_per_hour.insert("critical".to_string(), 50);
        max_per_hour.insert("high".to_string(), 20);
        max_per_hour.insert("medium".to_string(), 10);
        max_per_hour.insert("low".to_string(), 5);
        Self { max_per_hour }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    pub critical_secs: u64,
    pub high_secs: u64,
    pub medium_secs: u64,
    pub low_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            critical_secs: 30 * 60,
            high_secs: 60 * 60,
            medium_secs: 120 * 60,
            low_secs: 240 * 60,
        }
    }
}

impl CooldownConfig {
    pub fn for_priority(&self, p: Priority) -> Duration {
        Duration::from_secs(match p {
            Priority::Critical => self.critical_secs,
            Priority::High => self.high_secs,
            Priority::Medium => self.medium_secs,
            Priority::Low => self.low_secs,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityWeights {
    pub volume: f64,
    pub edge: f64,
    pub catalyst: f64,
    pub quality: f64,
}

impl Default for OpportunityWeights {
    fn default() -> Self {
        Self {
            volume: 0.30,
            edge: 0.25,
            catalyst: 0.25,
            quality: 0.20,
        }
    }
}

impl OpportunityWeights {
    pub fn sum(&self) -> f64 {
        self.volume + self.edge + self.catalyst + self.quality
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            critical: 80.0,
            high: 60.0,
            medium: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub scan_interval: Duration,
    pub min_volume_floor: f64,
    pub volume_spike_multiplier: f64,
    pub min_volume_threshold: f64,
    pub price_move_threshold_pct: f64,
    pub baseline_expected_change_pct: f64,
    pub new_market_activity_threshold: f64,
    pub activity_threshold: f64,
    pub correlation_threshold: f64,
    pub min_markets: usize,
    pub stat_window: usize,
    pub min_sample: usize,
    pub ewma_alpha: f64,
    pub anomaly_consensus_threshold: f64,
    pub min_opportunity_score: f64,
    pub min_category_score: u32,
    pub opportunity_weights: OpportunityWeights,
    pub priority_thresholds: PriorityThresholds,
    pub rate_limits: RateLimitConfig,
    pub cooldowns: CooldownConfig,
    pub validation_window_hours: i64,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            min_volume_floor: 1_000.0,
            volume_spike_multiplier: 3.0,
            min_volume_threshold: 5_000.0,
            price_move_threshold_pct: 10.0,
            baseline_expected_change_pct: 2.0,
            new_market_activity_threshold: 20.0,
            activity_threshold: 60.0,
            correlation_threshold: 0.02,
            min_markets: 2,
            stat_window: 720,
            min_sample: 30,
            ewma_alpha: 0.1,
            anomaly_consensus_threshold: 0.6,
            min_opportunity_score: 30.0,
            min_category_score: 1,
            opportunity_weights: OpportunityWeights::default(),
            priority_thresholds: PriorityThresholds::default(),
            rate_limits: RateLimitConfig::default(),
            cooldowns: CooldownConfig::default(),
            validation_window_hours: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Conservative,
    Balanced,
    Aggressive,
    Development,
}

impl Preset {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "conservative" => Some(Self::Conservative),
            "balanced" => Some(Self::Balanced),
            "aggressive" => Some(Self::Aggressive),
            "development" => Some(Self::Development),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        let mut cfg = ConfigSnapshot::default();
        match self {
            Preset::Conservative => {
                cfg.volume_spike_multiplier = 5.0;
                cfg.min_opportunity_score = 50.0;
                cfg.anomaly_consensus_threshold = 0.75;
                cfg.priority_thresholds = PriorityThresholds {
                    critical: 85.0,
                    high: 70.0,
                    medium: 50.0,
                };
            }
            Preset::Balanced => {}
            Preset::Aggressive => {
                cfg.volume_spike_multiplier = 2.0;
                cfg.min_opportunity_score = 20.0;
                cfg.anomaly_consensus_threshold = 0.45;
                cfg.priority_thresholds = PriorityThresholds {
                    critical: 70.0,
                    high: 50.0,
                    medium: 30.0,
                };
            }
            Preset::Development => {
                cfg.scan_interval = Duration::from_secs(60);
                cfg.min_volume_floor = 0.0;
                cfg.min_opportunity_score = 0.0;
            }
        }
        cfg
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("correlation threshold must be in [0, 1], got {0}")]
    CorrelationThreshold(f64),
    #[error("priority ordering violated: medium={medium} high={high} critical={critical}")]
    PriorityOrdering { medium: f64, high: f64, critical: f64 },
    #[error("opportunity weights sum to {0}, must be in [0.95, 1.05]")]
    WeightsSum(f64),
    #[error("volume multiplier must be > 1.0, got {0}")]
    VolumeMultiplier(f64),
    #[error("window must be >= 60s, got {0:?}")]
    WindowTooShort(Duration),
    #[error("min_markets must be >= 2, got {0}")]
    MinMarkets(usize),
}

pub fn validate(cfg: &ConfigSnapshot) -> Result<(), ConfigValidationError> {
    if !(0.0..=1.0).contains(&cfg.correlation_threshold) {
        return Err(ConfigValidationError::CorrelationThreshold(cfg.correlation_threshold));
    }
    let t = &cfg.priority_thresholds;
    if !(t.medium < t.high && t.high < t.critical) {
        return Err(ConfigValidationError::PriorityOrdering {
            medium: t.medium,
            high: t.high,
            critical: t.critical,
        });
    }
    let sum = cfg.opportunity_weights.sum();
    if !(0.95..=1.05).contains(&sum) {
        return Err(ConfigValidationError::WeightsSum(sum));
    }
    if cfg.volume_spike_multiplier <= 1.0 {
        return Err(ConfigValidationError::VolumeMultiplier(cfg.volume_spike_multiplier));
    }
    if cfg.scan_interval < Duration::from_secs(60) {
        // scan_interval is the only externally-tunable window in this
        // snapshot; §6 requires rejecting any window < 60s.
        return Err(ConfigValidationError::WindowTooShort(cfg.scan_interval));
    }
    if cfg.min_markets < 2 {
        return Err(ConfigValidationError::MinMarkets(cfg.min_markets));
    }
    Ok(())
}

/// Owns the live configuration. Writers serialize through `apply`; readers
/// take a cheap snapshot copy (`current`), matching §5's read-mostly
/// config model.
pub struct ConfigManager {
    inner: RwLock<ConfigSnapshot>,
}

impl ConfigManager {
    pub fn new(initial: ConfigSnapshot) -> Result<Self, ConfigValidationError> {
        validate(&initial)?;
        Ok(Self {
            inner: RwLock::new(initial),
        })
    }

    pub fn from_env() -> Self {
        Self {
            inner: RwLock::new(ConfigSnapshot::default()),
        }
    }

    pub fn current(&self) -> ConfigSnapshot {
        self.inner.read().clone()
    }

    /// Transactional update: validate fully against the would-be snapshot;
    /// on failure the prior snapshot is left untouched.
    pub fn apply(&self, new_cfg: ConfigSnapshot) -> Result<(), ConfigValidationError> {
        validate(&new_cfg)?;
        *self.inner.write() = new_cfg;
        Ok(())
    }

    pub fn apply_preset(&self, preset: Preset) -> Result<(), ConfigValidationError> {
        self.apply(preset.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(validate(&ConfigSnapshot::default()).is_ok());
    }

    #[test]
    fn rejects_bad_priority_ordering() {
        let mut cfg = ConfigSnapshot::default();
        cfg.priority_thresholds.high = cfg.priority_thresholds.medium;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_weights_outside_tolerance() {
        let mut cfg = ConfigSnapshot::default();
        cfg.opportunity_weights.volume = 0.8;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_low_multiplier_and_short_window() {
        let mut cfg = ConfigSnapshot::default();
        cfg.volume_spike_multiplier = 1.0;
        assert!(validate(&cfg).is_err());

        let mut cfg2 = ConfigSnapshot::default();
        cfg2.scan_interval = Duration::from_secs(10);
        assert!(validate(&cfg2).is_err());
    }

    #[test]
    fn manager_reverts_on_invalid_apply() {
        let mgr = ConfigManager::new(ConfigSnapshot::default()).unwrap();
        let before = mgr.current().min_opportunity_score;
        let mut bad = mgr.current();
        bad.min_markets = 1;
        assert!(mgr.apply(bad).is_err());
        assert_eq!(mgr.current().min_opportunity_score, before);
    }

    #[test]
    fn all_presets_validate() {
        for p in [Preset::Conservative, Preset::Balanced, Preset::Aggressive, Preset::Development] {
            assert!(validate(&p.snapshot()).is_ok(), "{:?} failed", p);
        }
    }
}
