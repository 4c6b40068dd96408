//! Core data model: markets, snapshots, order books, ticks, and signals.
//!
//! Signal metadata is expressed as a tagged union over the closed set of
//! known signal types (§9 Design Notes: "re-express as a tagged union"),
//! rather than a heterogeneous bag — each variant carries exactly the
//! evidence its detector produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monitoring-intensity tier assigned to a market each scan tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Active,
    Watchlist,
    Ignored,
}

/// A prediction market as fetched from the external catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub market_id: String,
    pub question: String,
    pub description: String,
    pub outcomes: Vec<String>,
    pub outcome_prices: Vec<f64>,
    pub volume: f64,
    pub active: bool,
    pub closed: bool,
    pub end_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,

    // Derived fields, populated in-tick by C8 -> C9 -> tier assignment, in
    // that order. Never mutated again once a signal referencing this
    // market has been enqueued for notification.
    pub category: Option<String>,
    pub category_score: u32,
    pub is_blacklisted: bool,
    pub tier: Tier,
    pub opportunity_score: f64,
    pub volume_score: f64,
    pub edge_score: f64,
    pub catalyst_score: f64,
    pub quality_score: f64,
}

impl Market {
    pub fn new(
        market_id: impl Into<String>,
        question: impl Into<String>,
        description: impl Into<String>,
        outcomes: Vec<String>,
        outcome_prices: Vec<f64>,
        volume: f64,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            question: question.into(),
            description: description.into(),
            outcomes,
            outcome_prices,
            volume,
            active: true,
            closed: false,
            end_date: None,
            tags: Vec::new(),
            category: None,
            category_score: 0,
            is_blacklisted: false,
            tier: Tier::Watchlist,
            opportunity_score: 0.0,
            volume_score: 0.0,
            edge_score: 0.0,
            catalyst_score: 0.0,
            quality_score: 0.0,
        }
    }

    /// Spread in basis points on the best outcome price, used only when no
    /// order book is available (falls back to 0 for single-outcome data).
    pub fn text_blob(&self) -> String {
        format!("{} {}", self.question, self.description)
    }

    pub fn market_age(&self, now: DateTime<Utc>, listed_at: DateTime<Utc>) -> chrono::Duration {
        now - listed_at
    }

    pub fn time_to_close(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.end_date.map(|end| end - now)
    }
}

/// One snapshot of a market's vitals, taken once per scan tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub t: DateTime<Utc>,
    pub volume_24h: f64,
    pub prices: Vec<f64>,
    /// outcome index -> percent change since the prior snapshot
    pub price_change: Vec<f64>,
    pub activity_score: f64,
    pub volume_change_pct: f64,
}

/// A single order-book price level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: f64,
    pub size: f64,
}

impl OrderBookLevel {
    pub fn volume(&self) -> f64 {
        self.price * self.size
    }
}

/// Full order-book state for a market at a point in time.
///
/// Invariant: `bids` sorted descending by price, `asks` ascending;
/// `best_ask >= best_bid`; every price lies in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub market_id: String,
    pub t: DateTime<Utc>,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Absolute spread (ask - bid). Not normalized by mid-price: a 2.7c
    /// spread costs the same whether the market sits at 5% or 95%.
    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()? - self.best_bid()?)
    }

    pub fn spread_bps(&self) -> Option<f64> {
        self.spread().map(|s| s * 10_000.0)
    }

    pub fn mid_price(&self) -> Option<f64> {
        Some((self.best_bid()? + self.best_ask()?) / 2.0)
    }

    /// Validates the invariants from §3/§8. Returns the violation reason on
    /// failure so callers can classify it as a `DataShape` error.
    pub fn validate(&self) -> Result<(), &'static str> {
        for w in self.bids.windows(2) {
            if w[0].price < w[1].price {
                return Err("bids not sorted descending");
            }
        }
        for w in self.asks.windows(2) {
            if w[0].price > w[1].price {
                return Err("asks not sorted ascending");
            }
        }
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if ask < bid {
                return Err("best_ask < best_bid");
            }
        }
        for level in self.bids.iter().chain(self.asks.iter()) {
            if !(0.0..=1.0).contains(&level.price) {
                return Err("price outside [0, 1]");
            }
        }
        Ok(())
    }

    /// Volume-weighted mid across the top `k` levels on each side (micro-price).
    pub fn micro_price(&self, k: usize) -> Option<f64> {
        let bid_vol: f64 = self.bids.iter().take(k).map(|l| l.size).sum();
        let ask_vol: f64 = self.asks.iter().take(k).map(|l| l.size).sum();
        let total = bid_vol + ask_vol;
        if total <= 0.0 {
            return self.mid_price();
        }
        let best_bid = self.best_bid()?;
        let best_ask = self.best_ask()?;
        Some((best_bid * ask_vol + best_ask * bid_vol) / total)
    }

    /// Order-book imbalance over the top `depth` levels on each side.
    pub fn imbalance(&self, depth: usize) -> f64 {
        let bid_vol: f64 = self.bids.iter().take(depth).map(|l| l.volume()).sum();
        let ask_vol: f64 = self.asks.iter().take(depth).map(|l| l.volume()).sum();
        let total = bid_vol + ask_vol;
        if total <= 0.0 {
            0.0
        } else {
            (bid_vol - ask_vol) / total
        }
    }

    pub fn depth_at(&self, level: usize) -> f64 {
        let bid = self.bids.get(level).map(|l| l.size).unwrap_or(0.0);
        let ask = self.asks.get(level).map(|l| l.size).unwrap_or(0.0);
        bid + ask
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeTick {
    pub t: DateTime<Utc>,
    pub market_id: String,
    pub price: f64,
    pub volume: f64,
    pub side: Side,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// Evidence payload specific to each signal type. Anything outside this
/// closed set is rejected at emit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal_type", rename_all = "snake_case")]
pub enum SignalPayload {
    VolumeSpike {
        current_volume: f64,
        spike_multiplier: f64,
    },
    PriceMovement {
        outcome_index: usize,
        price_change_pct: f64,
        baseline_expected_pct: f64,
    },
    NewMarket {
        activity_score: f64,
    },
    ActivitySurge {
        activity_score: f64,
    },
    Microstructure {
        z_scores: Vec<(String, f64)>,
        liquidity_vacuum: bool,
        severity: Severity,
    },
    CoordinatedCrossMarket {
        cluster_id: String,
        members: Vec<String>,
        avg_change_pct: f64,
        correlation_score: f64,
    },
    FrontRunning {
        score: f64,
        leak_probability: f64,
        time_to_news_minutes: f64,
        severity: Severity,
    },
    Anomaly {
        consensus: f64,
        univariate: f64,
        mahalanobis: f64,
        isolation: f64,
        severity: Severity,
        explanation: String,
        remediation: Vec<String>,
    },
}

impl SignalPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            SignalPayload::VolumeSpike { .. } => "volume_spike",
            SignalPayload::PriceMovement { .. } => "price_movement",
            SignalPayload::NewMarket { .. } => "new_market",
            SignalPayload::ActivitySurge { .. } => "activity_surge",
            SignalPayload::Microstructure { .. } => "microstructure",
            SignalPayload::CoordinatedCrossMarket { .. } => "coordinated_cross_market",
            SignalPayload::FrontRunning { .. } => "front_running",
            SignalPayload::Anomaly { .. } => "anomaly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: uuid::Uuid,
    pub market_id: String,
    pub market_question: String,
    pub confidence: f64,
    pub t: DateTime<Utc>,
    pub payload: SignalPayload,
}

impl Signal {
    pub fn new(market_id: impl Into<String>, market_question: impl Into<String>, confidence: f64, payload: SignalPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            market_id: market_id.into(),
            market_question: market_question.into(),
            confidence: confidence.clamp(0.0, 1.0),
            t: Utc::now(),
            payload,
        }
    }

    pub fn signal_type(&self) -> &'static str {
        self.payload.type_name()
    }
}

/// A persisted alert record, the row shape from §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub market_id: String,
    pub signal_type: String,
    pub priority: Priority,
    pub opportunity_score: f64,
    pub t: DateTime<Utc>,
    pub notification_sent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: f64, size: f64) -> OrderBookLevel {
        OrderBookLevel { price, size }
    }

    #[test]
    fn spread_bps_is_absolute_not_mid_normalized() {
        let ob_low = OrderBook {
            market_id: "m1".into(),
            t: Utc::now(),
            bids: vec![level(0.04, 100.0)],
            asks: vec![level(0.067, 100.0)],
        };
        let ob_high = OrderBook {
            market_id: "m2".into(),
            t: Utc::now(),
            bids: vec![level(0.94, 100.0)],
            asks: vec![level(0.967, 100.0)],
        };
        // same absolute 2.7c spread at very different mid-prices
        assert!((ob_low.spread_bps().unwrap() - ob_high.spread_bps().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_crossed_book() {
        let ob = OrderBook {
            market_id: "m1".into(),
            t: Utc::now(),
            bids: vec![level(0.60, 10.0)],
            asks: vec![level(0.50, 10.0)],
        };
        assert!(ob.validate().is_err());
    }

    #[test]
    fn micro_price_weights_toward_thinner_side() {
        let ob = OrderBook {
            market_id: "m1".into(),
            t: Utc::now(),
            bids: vec![level(0.40, 1000.0)],
            asks: vec![level(0.60, 10.0)],
        };
        let mp = ob.micro_price(1).unwrap();
        // heavy bid size pulls micro-price toward the ask
        assert!(mp > 0.5);
    }
}
