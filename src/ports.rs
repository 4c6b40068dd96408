//! External collaborator interfaces (§6).
//!
//! The venue REST/WebSocket clients, persistent storage backend, webhook
//! transport, and config-file loading are explicitly out of scope (§1);
//! the engine only depends on these trait boundaries. Each port's default
//! implementation is a harmless stub suitable for tests; production
//! adapters are injected by the binary's wiring in `main.rs`.

use crate::error::EngineResult;
use crate::models::{Market, OrderBook, Signal};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait MarketCatalogPort: Send + Sync {
    async fn markets_with_min_volume(&self, min_volume: f64, max_markets: usize) -> EngineResult<Vec<Market>>;
    async fn market_by_id(&self, id: &str) -> EngineResult<Option<Market>>;
    async fn health_check(&self) -> EngineResult<PortHealth>;
}

#[derive(Debug, Clone)]
pub struct PortHealth {
    pub healthy: bool,
    pub details: String,
}

/// Subscribe-style live order-book stream. The adapter handles reconnects;
/// the core only needs to tolerate duplicate consecutive frames and
/// per-market monotonic timestamps (at-least-once delivery).
#[async_trait]
pub trait LiveOrderBookPort: Send + Sync {
    async fn subscribe(&self, market_ids: &[String]) -> EngineResult<tokio::sync::mpsc::Receiver<OrderBook>>;
}

#[async_trait]
pub trait PersistentStorePort: Send + Sync {
    async fn save_signal(&self, signal: &Signal) -> EngineResult<()>;
    async fn price_history(&self, market_id: &str, hours: u32) -> EngineResult<Vec<f64>>;
    async fn save_backtest_results(&self, payload: &serde_json::Value) -> EngineResult<()>;
    async fn health_check(&self) -> EngineResult<PortHealth>;
}

/// No-op store satisfying §9 Open Question (b): the read paths are stubs,
/// a real backend is out of scope.
pub struct NullPersistentStore;

#[async_trait]
impl PersistentStorePort for NullPersistentStore {
    async fn save_signal(&self, _signal: &Signal) -> EngineResult<()> {
        Ok(())
    }

    async fn price_history(&self, _market_id: &str, _hours: u32) -> EngineResult<Vec<f64>> {
        Ok(Vec::new())
    }

    async fn save_backtest_results(&self, _payload: &serde_json::Value) -> EngineResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> EngineResult<PortHealth> {
        Ok(PortHealth {
            healthy: true,
            details: "null store".into(),
        })
    }
}

#[async_trait]
pub trait WebhookPort: Send + Sync {
    async fn deliver(&self, payload: serde_json::Value, deadline: Duration) -> EngineResult<()>;
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SignalTypeStats {
    pub n: u64,
    pub accuracy: f64,
    pub win_rate: f64,
    pub avg_pnl_1h: f64,
    pub avg_pnl_24h: f64,
    pub sharpe: f64,
    pub kelly_fraction: f64,
    pub posterior_confidence: f64,
}

/// Optional enrichment port for the notification formatter's
/// historical-performance embed fields (CRITICAL/HIGH only).
#[async_trait]
pub trait PerformanceTrackingPort: Send + Sync {
    async fn signal_type_stats(&self, signal_type: &str) -> EngineResult<Option<SignalTypeStats>>;
}

pub struct NullPerformanceTracker;

#[async_trait]
impl PerformanceTrackingPort for NullPerformanceTracker {
    async fn signal_type_stats(&self, _signal_type: &str) -> EngineResult<Option<SignalTypeStats>> {
        Ok(None)
    }
}
