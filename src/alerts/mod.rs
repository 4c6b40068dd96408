//! Alert manager (C10): priority assignment, quality filter, hourly rate
//! limiting, per-(market, priority) cooldown, and alert history.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::{CooldownConfig, PriorityThresholds, RateLimitConfig};
use crate::models::{AlertRecord, Priority, Tier};

#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    Approved(Priority),
    Filtered(&'static str),
    RateLimited,
    Cooldown,
}

struct HourlyCounter {
    count: u32,
    window_start: DateTime<Utc>,
}

struct AlertState {
    hourly: HashMap<Priority, HourlyCounter>,
    cooldowns: HashMap<(String, Priority), DateTime<Utc>>,
    history: Vec<AlertRecord>,
}

impl AlertState {
    fn new() -> Self {
        Self {
            hourly: HashMap::new(),
            cooldowns: HashMap::new(),
            history: Vec::new(),
        }
    }
}

pub struct AlertManager {
    feature_enabled: bool,
    min_opportunity_score: f64,
    min_category_score: u32,
    priority_thresholds: PriorityThresholds,
    rate_limits: RateLimitConfig,
    cooldowns: CooldownConfig,
    state: Mutex<AlertState>,
}

impl AlertManager {
    pub fn new(
        feature_enabled: bool,
        min_opportunity_score: f64,
        min_category_score: u32,
        priority_thresholds: PriorityThresholds,
        rate_limits: RateLimitConfig,
        cooldowns: CooldownConfig,
    ) -> Self {
        Self {
            feature_enabled,
            min_opportunity_score,
            min_category_score,
            priority_thresholds,
            rate_limits,
            cooldowns,
            state: Mutex::new(AlertState::new()),
        }
    }

    pub fn evaluate(
        &self,
        market_id: &str,
        opportunity_score: f64,
        category_score: u32,
        is_blacklisted: bool,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        if !self.feature_enabled {
            return AlertDecision::Filtered("disabled");
        }
        if is_blacklisted {
            return AlertDecision::Filtered("blacklisted");
        }
        if opportunity_score < self.min_opportunity_score {
            return AlertDecision::Filtered("below min opportunity score");
        }
        if category_score < self.min_category_score {
            return AlertDecision::Filtered("below min category score");
        }
        if tier == Tier::Ignored {
            return AlertDecision::Filtered("tier ignored");
        }

        let tier_boost = match tier {
            Tier::Active => 0.0,
            Tier::Watchlist => 5.0,
            Tier::Ignored => 0.0,
        };
        let adjusted_score = (opportunity_score + tier_boost).clamp(0.0, 100.0);

        let priority = self.assign_priority(adjusted_score);

        if !self.tier_permits(tier, priority) {
            return AlertDecision::Filtered("below tier minimum priority");
        }

        let mut state = self.state.lock();
        if self.is_rate_limited(&mut state, priority, now) {
            return AlertDecision::RateLimited;
        }
        if self.in_cooldown(&state, market_id, priority, now) {
            return AlertDecision::Cooldown;
        }

        AlertDecision::Approved(priority)
    }

    fn assign_priority(&self, score: f64) -> Priority {
        let t = &self.priority_thresholds;
        debug_assert!(t.medium < t.high && t.high < t.critical);
        if score >= t.critical {
            Priority::Critical
        } else if score >= t.high {
            Priority::High
        } else if score >= t.medium {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    fn tier_permits(&self, tier: Tier, priority: Priority) -> bool {
        match tier {
            Tier::Active => true,
            Tier::Watchlist => priority >= Priority::Medium,
            Tier::Ignored => false,
        }
    }

    fn is_rate_limited(&self, state: &mut AlertState, priority: Priority, now: DateTime<Utc>) -> bool {
        let max = *self
            .rate_limits
            .max_per_hour
            .get(priority.as_str())
            .unwrap_or(&u32::MAX);

        let counter = state.hourly.entry(priority).or_insert_with(|| HourlyCounter {
            count: 0,
            window_start: now,
        });
        if now - counter.window_start >= chrono::Duration::hours(1) {
            counter.count = 0;
            counter.window_start = now;
        }
        counter.count >= max
    }

    fn in_cooldown(&self, state: &AlertState, market_id: &str, priority: Priority, now: DateTime<Utc>) -> bool {
        match state.cooldowns.get(&(market_id.to_string(), priority)) {
            Some(last_sent) => {
                let elapsed = now - *last_sent;
                elapsed < self.cooldowns.for_priority(priority).to_chrono()
            }
            None => false,
        }
    }

    /// Called after a delivery attempt (success or failure): appends
    /// history, increments the hourly counter, and updates the cooldown
    /// map so the next `evaluate` call sees this send.
    pub fn record_alert(&self, record: AlertRecord, now: DateTime<Utc>) {
        let mut state = self.state.lock();

        let counter = state.hourly.entry(record.priority).or_insert_with(|| HourlyCounter {
            count: 0,
            window_start: now,
        });
        counter.count += 1;

        state
            .cooldowns
            .insert((record.market_id.clone(), record.priority), now);
        state.history.push(record);
    }

    /// Drops history older than 24h and cooldown entries whose elapsed
    /// time already exceeds their priority's cooldown window.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.history.retain(|r| now - r.t < chrono::Duration::hours(24));

        let cooldowns = &self.cooldowns;
        state
            .cooldowns
            .retain(|(_, priority), last_sent| now - *last_sent < cooldowns.for_priority(*priority).to_chrono());
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }
}

trait ToChrono {
    fn to_chrono(self) -> chrono::Duration;
}

impl ToChrono for Duration {
    fn to_chrono(self) -> chrono::Duration {
        chrono::Duration::from_std(self).unwrap_or_else(|_| chrono::Duration::seconds(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AlertManager {
        let mut rate_limits = RateLimitConfig::default();
        rate_limits.max_per_hour.insert("low".to_string(), 2);
        AlertManager::new(
            true,
            30.0,
            1,
            PriorityThresholds::default(),
            rate_limits,
            CooldownConfig::default(),
        )
    }

    #[test]
    fn blacklisted_market_is_filtered() {
        let mgr = manager();
        let decision = mgr.evaluate("m1", 90.0, 3, true, Tier::Active, Utc::now());
        assert_eq!(decision, AlertDecision::Filtered("blacklisted"));
    }

    #[test]
    fn watchlist_tier_blocks_low_priority() {
        let mgr = manager();
        let decision = mgr.evaluate("m1", 35.0, 3, false, Tier::Watchlist, Utc::now());
        assert_eq!(decision, AlertDecision::Filtered("below tier minimum priority"));
    }

    #[test]
    fn priority_thresholds_ladder_correctly() {
        let mgr = manager();
        assert_eq!(mgr.evaluate("m1", 85.0, 3, false, Tier::Active, Utc::now()), AlertDecision::Approved(Priority::Critical));
        assert_eq!(mgr.evaluate("m2", 65.0, 3, false, Tier::Active, Utc::now()), AlertDecision::Approved(Priority::High));
        assert_eq!(mgr.evaluate("m3", 45.0, 3, false, Tier::Active, Utc::now()), AlertDecision::Approved(Priority::Medium));
        assert_eq!(mgr.evaluate("m4", 35.0, 3, false, Tier::Active, Utc::now()), AlertDecision::Approved(Priority::Low));
    }

    #[test]
    fn hourly_rate_limit_blocks_after_max() {
        let mgr = manager();
        let now = Utc::now();
        for _ in 0..2 {
            assert_eq!(mgr.evaluate("m1", 35.0, 3, false, Tier::Active, now), AlertDecision::Approved(Priority::Low));
            mgr.record_alert(
                AlertRecord {
                    market_id: "m1".into(),
                    signal_type: "volume_spike".into(),
                    priority: Priority::Low,
                    opportunity_score: 35.0,
                    t: now,
                    notification_sent: true,
                },
                now,
            );
        }
        assert_eq!(mgr.evaluate("m1", 35.0, 3, false, Tier::Active, now), AlertDecision::RateLimited);
    }

    #[test]
    fn cooldown_blocks_repeat_alert_for_same_market_and_priority() {
        let mgr = manager();
        let now = Utc::now();
        mgr.record_alert(
            AlertRecord {
                market_id: "m1".into(),
                signal_type: "volume_spike".into(),
                priority: Priority::Critical,
                opportunity_score: 90.0,
                t: now,
                notification_sent: true,
            },
            now,
        );
        let decision = mgr.evaluate("m1", 90.0, 3, false, Tier::Active, now + chrono::Duration::minutes(5));
        assert_eq!(decision, AlertDecision::Cooldown);
    }

    #[test]
    fn sweep_drops_expired_cooldowns() {
        let mgr = manager();
        let now = Utc::now();
        mgr.record_alert(
            AlertRecord {
                market_id: "m1".into(),
                signal_type: "volume_spike".into(),
                priority: Priority::Low,
                opportunity_score: 35.0,
                t: now,
                notification_sent: true,
            },
            now,
        );
        mgr.sweep(now + chrono::Duration::hours(5));
        let decision = mgr.evaluate("m1", 35.0, 3, false, Tier::Active, now + chrono::Duration::hours(5));
        assert_eq!(decision, AlertDecision::Approved(Priority::Low));
    }
}
