//! Bot orchestrator (C12): periodic scan loop, hot-config reload,
//! lifecycle, and per-tick wiring of C5 through C11.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::alerts::{AlertDecision, AlertManager};
use crate::anomaly::AnomalyDetector;
use crate::categorize::{filter_markets_by_volume, MarketCategorizer, VolumeThresholds};
use crate::clustering::TopicClusterer;
use crate::config::ConfigManager;
use crate::frontrun::FrontRunScorer;
use crate::microstructure::MicrostructureAnalyzer;
use crate::models::{AlertRecord, Market, MarketSnapshot, Priority, Signal};
use crate::notify::NotificationFormatter;
use crate::ports::{MarketCatalogPort, PerformanceTrackingPort, PersistentStorePort, WebhookPort};
use crate::scoring::{OpportunityScorer, ScoringParams};
use crate::signals::detector::SignalDetector;
use crate::stats::StatisticalKernel;
use crate::telemetry::MetricsRegistry;

const MAX_MARKETS_PER_TICK: usize = 500;
const SNAPSHOT_HISTORY_DEPTH: usize = 20;

pub struct Orchestrator {
    config: Arc<ConfigManager>,
    catalog: Arc<dyn MarketCatalogPort>,
    store: Arc<dyn PersistentStorePort>,
    webhook: Arc<dyn WebhookPort>,
    performance: Arc<dyn PerformanceTrackingPort>,

    kernel: Arc<StatisticalKernel>,
    anomaly: Arc<AnomalyDetector>,
    microstructure: Arc<MicrostructureAnalyzer>,
    detector: SignalDetector,
    categorizer: MarketCategorizer,
    volume_thresholds: tokio::sync::RwLock<VolumeThresholds>,
    clusterer: tokio::sync::RwLock<TopicClusterer>,
    frontrun: FrontRunScorer,
    scorer: OpportunityScorer,
    alerts: AlertManager,
    metrics: Arc<MetricsRegistry>,

    history: tokio::sync::RwLock<HashMap<String, Vec<MarketSnapshot>>>,
    shutdown: Arc<Notify>,
    running: AtomicBool,
}

impl Orchestrator {
    pub fn new(
        config: Arc<ConfigManager>,
        catalog: Arc<dyn MarketCatalogPort>,
        store: Arc<dyn PersistentStorePort>,
        webhook: Arc<dyn WebhookPort>,
        performance: Arc<dyn PerformanceTrackingPort>,
    ) -> anyhow::Result<Self> {
        let snapshot = config.current();
        crate::config::validate(&snapshot)?;

        let kernel = Arc::new(StatisticalKernel::new(snapshot.stat_window, snapshot.min_sample));

        Ok(Self {
            anomaly: Arc::new(AnomalyDetector::new(kernel.clone(), snapshot.anomaly_consensus_threshold)),
            microstructure: Arc::new(MicrostructureAnalyzer::new(kernel.clone())),
            detector: SignalDetector::new(chrono::Duration::seconds(snapshot.scan_interval.as_secs() as i64 * 20)),
            categorizer: MarketCategorizer::new(),
            volume_thresholds: tokio::sync::RwLock::new(VolumeThresholds::default()),
            clusterer: tokio::sync::RwLock::new(TopicClusterer::new(crate::clustering::default_clusters())),
            frontrun: FrontRunScorer::new(),
            scorer: OpportunityScorer::new(ScoringParams::default()),
            alerts: AlertManager::new(
                true,
                snapshot.min_opportunity_score,
                snapshot.min_category_score,
                snapshot.priority_thresholds.clone(),
                snapshot.rate_limits.clone(),
                snapshot.cooldowns.clone(),
            ),
            metrics: Arc::new(MetricsRegistry::new()),
            history: tokio::sync::RwLock::new(HashMap::new()),
            shutdown: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
            kernel,
            config,
            catalog,
            store,
            webhook,
            performance,
        })
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Launches the scan loop; each tick awaits completion of the previous
    /// one (ticks never overlap). Returns when `stop()` is called.
    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!("🔌 orchestrator starting scan loop");

        loop {
            let period = self.config.current().scan_interval;
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("🛑 orchestrator received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(period) => {
                    if let Err(e) = self.tick().await {
                        error!("⚠️ scan tick failed: {e}");
                        self.metrics.record_error("orchestrator");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("✅ orchestrator stopped");
    }

    /// Idempotent: a second call while already stopped is a no-op.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.shutdown.notify_one();
        }
    }

    /// Re-queries the config provider and rebuilds only the affected
    /// tables; running state (history, cooldowns, covariance) is preserved.
    pub async fn reload_config(&self) -> anyhow::Result<()> {
        let snapshot = self.config.current();
        crate::config::validate(&snapshot)?;
        info!("📊 hot-reloaded config");
        Ok(())
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let cfg = self.config.current();
        let now = Utc::now();

        let mut markets = self
            .catalog
            .markets_with_min_volume(cfg.min_volume_floor, MAX_MARKETS_PER_TICK)
            .await
            .map_err(anyhow::Error::from)?;

        for market in markets.iter_mut() {
            self.categorizer.apply(market);
        }
        let thresholds = self.volume_thresholds.read().await;
        let filtered_ids: Vec<String> = filter_markets_by_volume(&markets, &thresholds)
            .into_iter()
            .map(|m| m.market_id.clone())
            .collect();
        drop(thresholds);

        let listed_at = None;
        for market in markets.iter_mut() {
            if !filtered_ids.contains(&market.market_id) {
                continue;
            }
            let breakdown = self.scorer.score(
                market,
                &cfg.opportunity_weights,
                &self.volume_thresholds.read().await,
                0.0,
                listed_at,
                now,
            );
            market.opportunity_score = breakdown.total;
            market.volume_score = breakdown.volume_score;
            market.edge_score = breakdown.edge_score;
            market.catalyst_score = breakdown.catalyst_score;
            market.quality_score = breakdown.quality_score;
            market.tier = assign_tier(breakdown.total);
        }

        self.metrics.set_markets_tracked(filtered_ids.len() as u64);

        let history = self.history.read().await.clone();
        let signals = self.detector.detect_all(&markets, &history, &cfg, now);

        {
            let mut clusterer = self.clusterer.write().await;
            clusterer.assign(&markets);
        }

        let mut all_signals = signals;
        let price_changes: HashMap<String, f64> = history
            .iter()
            .filter_map(|(id, snaps)| snaps.last().and_then(|s| s.price_change.first()).map(|c| (id.clone(), *c)))
            .collect();
        {
            let clusterer = self.clusterer.read().await;
            for (_, signal) in clusterer.detect_coordinated_movement(&price_changes, cfg.correlation_threshold) {
                all_signals.push(signal);
            }
        }

        for signal in &all_signals {
            self.metrics.incr_signals_generated(signal.signal_type());
            if let Err(e) = self.store.save_signal(signal).await {
                warn!("⚠️ failed to persist signal: {e}");
            }
            self.route_to_alerts(signal, &markets, now).await;
        }

        self.update_history(&markets, now).await;
        self.alerts.sweep(now);

        Ok(())
    }

    async fn route_to_alerts(&self, signal: &Signal, markets: &[Market], now: chrono::DateTime<Utc>) {
        let Some(market) = markets.iter().find(|m| m.market_id == signal.market_id) else {
            return;
        };

        let decision = self.alerts.evaluate(
            &market.market_id,
            market.opportunity_score,
            market.category_score,
            market.is_blacklisted,
            market.tier,
            now,
        );

        let priority = match decision {
            AlertDecision::Approved(p) => p,
            AlertDecision::Filtered(reason) => {
                info!(market_id = %market.market_id, reason, "signal filtered before delivery");
                return;
            }
            AlertDecision::RateLimited => {
                warn!(market_id = %market.market_id, "⚠️ rate-limited");
                return;
            }
            AlertDecision::Cooldown => {
                return;
            }
        };

        let formatter = NotificationFormatter::new(self.webhook.as_ref(), self.performance.as_ref());
        let market_url = format!("https://polymarket.com/event/{}", market.market_id);
        let embed = formatter.render(signal, market, priority, market.opportunity_score, &market_url).await;
        let sent = formatter.dispatch(embed).await.is_ok();

        if sent {
            self.metrics.incr_alerts_sent(priority.as_str());
        }

        self.alerts.record_alert(
            AlertRecord {
                market_id: market.market_id.clone(),
                signal_type: signal.signal_type().to_string(),
                priority,
                opportunity_score: market.opportunity_score,
                t: now,
                notification_sent: sent,
            },
            now,
        );
    }

    /// Feeds one live order-book frame through C4 (microstructure), C3
    /// (anomaly consensus on the resulting feature vector) and C7
    /// (front-running score), routing any emitted signals to C10/C11.
    /// Called by the per-market order-book consumer task spawned in
    /// `main.rs` for tracked (tier != Ignored) markets.
    pub async fn consume_order_book(&self, book: crate::models::OrderBook, market: &Market) {
        let (metrics, micro_signal) = self.microstructure.on_order_book_event(&book);

        let features = [
            market.volume,
            metrics.depth,
            metrics.spread_bps,
            metrics.imbalance,
            metrics.micro_price,
            metrics.micro_price_slope.abs(),
        ];
        let anomaly = self.anomaly.observe(&market.market_id, features);
        if anomaly.is_anomalous {
            self.metrics.incr_anomalies_detected();
        }

        let correlated = self.clusterer.read().await.correlated_markets(&market.market_id);
        let z_volume = self.kernel.z_score(&market.market_id, "volume", market.volume).z;
        let any_depth_or_imbalance_z_above_2 = metrics
            .z_scores
            .iter()
            .any(|(name, z)| (name == "depth" || name == "imbalance") && z.abs() > 2.0);

        let (_, frontrun_signal) = self.frontrun.score(
            &metrics,
            market,
            z_volume,
            any_depth_or_imbalance_z_above_2,
            correlated.len(),
            Utc::now(),
        );

        for signal in micro_signal.into_iter().chain(frontrun_signal) {
            self.metrics.incr_signals_generated(signal.signal_type());
            if let Err(e) = self.store.save_signal(&signal).await {
                warn!("⚠️ failed to persist signal: {e}");
            }
            self.route_to_alerts(&signal, std::slice::from_ref(market), Utc::now()).await;
        }
    }

    async fn update_history(&self, markets: &[Market], now: chrono::DateTime<Utc>) {
        let mut history = self.history.write().await;
        for market in markets {
            let entry = history.entry(market.market_id.clone()).or_default();
            let prev_volume = entry.last().map(|s| s.volume_24h).unwrap_or(market.volume);
            let volume_change_pct = if prev_volume > 0.0 { (market.volume - prev_volume) / prev_volume * 100.0 } else { 0.0 };
            let prev_prices = entry.last().map(|s| s.prices.clone()).unwrap_or_else(|| market.outcome_prices.clone());
            let price_change = market
                .outcome_prices
                .iter()
                .zip(prev_prices.iter())
                .map(|(now_p, prev_p)| if *prev_p != 0.0 { (now_p - prev_p) / prev_p * 100.0 } else { 0.0 })
                .collect();

            entry.push(MarketSnapshot {
                market_id: market.market_id.clone(),
                t: now,
                volume_24h: market.volume,
                prices: market.outcome_prices.clone(),
                price_change,
                activity_score: market.opportunity_score,
                volume_change_pct,
            });
            if entry.len() > SNAPSHOT_HISTORY_DEPTH {
                entry.remove(0);
            }
        }
    }
}

fn assign_tier(opportunity_score: f64) -> crate::models::Tier {
    if opportunity_score >= 60.0 {
        crate::models::Tier::Active
    } else if opportunity_score >= 20.0 {
        crate::models::Tier::Watchlist
    } else {
        crate::models::Tier::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_assignment_ladders_with_score() {
        assert_eq!(assign_tier(80.0), crate::models::Tier::Active);
        assert_eq!(assign_tier(30.0), crate::models::Tier::Watchlist);
        assert_eq!(assign_tier(5.0), crate::models::Tier::Ignored);
    }
}
