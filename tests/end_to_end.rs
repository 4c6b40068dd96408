//! End-to-end scenarios from the surveillance engine's testable-properties
//! list: each test drives two or more components together rather than a
//! single module in isolation.

use std::collections::HashMap;

use chrono::{Duration, Utc};

use market_surveillance_engine::alerts::{AlertDecision, AlertManager};
use market_surveillance_engine::categorize::{MarketCategorizer, VolumeThresholds};
use market_surveillance_engine::clustering::{default_clusters, TopicClusterer};
use market_surveillance_engine::config::{ConfigSnapshot, CooldownConfig, PriorityThresholds, RateLimitConfig};
use market_surveillance_engine::models::{Market, MarketSnapshot, Priority, Tier};
use market_surveillance_engine::signals::SignalDetector;

fn market(id: &str, question: &str, volume: f64) -> Market {
    Market::new(id, question, "", vec!["Yes".into(), "No".into()], vec![0.5, 0.5], volume)
}

fn snapshot(market_id: &str, volume_24h: f64) -> MarketSnapshot {
    MarketSnapshot {
        market_id: market_id.into(),
        t: Utc::now(),
        volume_24h,
        prices: vec![0.5, 0.5],
        price_change: vec![0.0, 0.0],
        activity_score: 0.0,
        volume_change_pct: 0.0,
    }
}

/// Scenario 1: volume-spike path. Ten prior snapshots at 10 000, then one
/// submission at 50 000 — exactly one signal, ~5x multiplier, confidence > 0.5.
#[test]
fn volume_spike_path_fires_once_with_expected_multiplier() {
    let detector = SignalDetector::new(Duration::minutes(15));
    let mut cfg = ConfigSnapshot::default();
    cfg.volume_spike_multiplier = 3.0;
    cfg.min_volume_threshold = 1_000.0;

    let m = market("m1", "will x happen?", 50_000.0);
    let mut history = HashMap::new();
    history.insert("m1".to_string(), (0..10).map(|_| snapshot("m1", 10_000.0)).collect());

    let signals = detector.detect_all(&[m], &history, &cfg, Utc::now());

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type(), "volume_spike");
    assert!(signals[0].confidence > 0.5);
}

/// Scenario 2: rate-limit enforcement. 25 distinct HIGH-priority markets
/// against a cap of 20/hour — the first 20 are approved, the rest rate-limited.
#[test]
fn rate_limit_enforcement_caps_at_configured_max() {
    let mut rate_limits = RateLimitConfig::default();
    rate_limits.max_per_hour.insert("high".to_string(), 20);
    let mgr = AlertManager::new(true, 0.0, 0, PriorityThresholds::default(), rate_limits, CooldownConfig::default());

    let now = Utc::now();
    let mut approved = 0;
    let mut rate_limited = 0;

    for i in 0..25 {
        let market_id = format!("m{i}");
        match mgr.evaluate(&market_id, 65.0, 1, false, Tier::Active, now) {
            AlertDecision::Approved(Priority::High) => {
                approved += 1;
                mgr.record_alert(
                    market_surveillance_engine::models::AlertRecord {
                        market_id,
                        signal_type: "volume_spike".into(),
                        priority: Priority::High,
                        opportunity_score: 65.0,
                        t: now,
                        notification_sent: true,
                    },
                    now,
                );
            }
            AlertDecision::RateLimited => rate_limited += 1,
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    assert_eq!(approved, 20);
    assert_eq!(rate_limited, 5);
}

/// Scenario 3: cooldown enforcement. One CRITICAL alert for a market, then
/// a second ten minutes later against a 30-minute cooldown is blocked.
#[test]
fn cooldown_enforcement_blocks_within_window() {
    let mgr = AlertManager::new(true, 0.0, 0, PriorityThresholds::default(), RateLimitConfig::default(), CooldownConfig::default());
    let now = Utc::now();

    let first = mgr.evaluate("m1", 90.0, 1, false, Tier::Active, now);
    assert_eq!(first, AlertDecision::Approved(Priority::Critical));
    mgr.record_alert(
        market_surveillance_engine::models::AlertRecord {
            market_id: "m1".into(),
            signal_type: "price_movement".into(),
            priority: Priority::Critical,
            opportunity_score: 90.0,
            t: now,
            notification_sent: true,
        },
        now,
    );

    let second = mgr.evaluate("m1", 90.0, 1, false, Tier::Active, now + Duration::minutes(10));
    assert_eq!(second, AlertDecision::Cooldown);
}

/// Scenario 4: tier minimum. A watchlist market needs at least MEDIUM
/// priority; a low-scoring watchlist market is filtered even after the
/// tier boost.
#[test]
fn tier_minimum_gates_watchlist_markets() {
    let mgr = AlertManager::new(true, 0.0, 0, PriorityThresholds::default(), RateLimitConfig::default(), CooldownConfig::default());
    let now = Utc::now();

    let approved = mgr.evaluate("m1", 42.0, 1, false, Tier::Watchlist, now);
    assert_eq!(approved, AlertDecision::Approved(Priority::Medium));

    let filtered = mgr.evaluate("m2", 30.0, 1, false, Tier::Watchlist, now);
    assert_eq!(filtered, AlertDecision::Filtered("below tier minimum priority"));
}

/// Scenario 5: blacklist. A crypto price-target market without a catalyst
/// is blacklisted by the categorizer and then excluded by the volume
/// filter regardless of its volume.
#[test]
fn blacklisted_market_never_passes_volume_filter() {
    let categorizer = MarketCategorizer::new();
    let mut m = market("m1", "Will Bitcoin hit $100,000 in 2025?", 1_000_000.0);
    categorizer.apply(&mut m);

    assert!(m.is_blacklisted);

    let thresholds = VolumeThresholds::default();
    let filtered = market_surveillance_engine::categorize::filter_markets_by_volume(&[m], &thresholds);
    assert!(filtered.is_empty());
}

/// Scenario 6: coordinated cross-market movement. A four-member cluster
/// where three markets move together past threshold and one does not.
#[test]
fn coordinated_cross_market_movement_excludes_non_qualifying_member() {
    let mut clusterer = TopicClusterer::new(default_clusters());
    let markets = vec![
        market("m1", "Will the president win the election?", 5_000.0),
        market("m2", "Will the senate flip in the election?", 5_000.0),
        market("m3", "Who wins the presidential election vote?", 5_000.0),
        market("m4", "Will the governor veto the new budget?", 5_000.0),
    ];
    clusterer.assign(&markets);

    let mut changes = HashMap::new();
    changes.insert("m1".to_string(), 3.0);
    changes.insert("m2".to_string(), 4.0);
    changes.insert("m3".to_string(), 3.5);
    changes.insert("m4".to_string(), -0.5);

    let reports = clusterer.detect_coordinated_movement(&changes, 2.0);
    assert_eq!(reports.len(), 1);

    let (movement, signal) = &reports[0];
    let mut members = movement.members.clone();
    members.sort();
    assert_eq!(members, vec!["m1".to_string(), "m2".to_string(), "m3".to_string()]);
    assert!((movement.avg_change_pct - 3.5).abs() < 1e-9);
    assert_eq!(signal.signal_type(), "coordinated_cross_market");
}
