//! Production port adapters (§6): a Gamma-style REST market catalog, a
//! CLOB-style polling order-book stream, and a Discord webhook transport.
//! The venue's wire format is out of scope for the engine itself; these
//! adapters are the only place that format leaks in.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::{EngineError, EngineResult};
use crate::models::{Market, OrderBook, OrderBookLevel, Signal};
use crate::ports::{LiveOrderBookPort, MarketCatalogPort, PortHealth, WebhookPort};

const COMPONENT: &str = "adapters";

#[derive(Debug, Deserialize)]
struct GammaMarket {
    id: String,
    question: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    outcomes: String,
    #[serde(default, rename = "outcomePrices")]
    outcome_prices: String,
    #[serde(default, rename = "volume24hr")]
    volume_24hr: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    closed: bool,
}

/// Reads markets from Polymarket's Gamma `markets` endpoint.
pub struct GammaMarketCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl GammaMarketCatalog {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn parse(raw: GammaMarket) -> Market {
        let outcomes: Vec<String> = serde_json::from_str(&raw.outcomes).unwrap_or_default();
        let outcome_prices: Vec<f64> = serde_json::from_str::<Vec<String>>(&raw.outcome_prices)
            .unwrap_or_default()
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        let volume = raw.volume_24hr.or(raw.volume).unwrap_or(0.0);

        let mut market = Market::new(raw.id, raw.question, raw.description, outcomes, outcome_prices, volume);
        market.active = raw.active;
        market.closed = raw.closed;
        market
    }
}

#[async_trait]
impl MarketCatalogPort for GammaMarketCatalog {
    async fn markets_with_min_volume(&self, min_volume: f64, max_markets: usize) -> EngineResult<Vec<Market>> {
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("active", "true"), ("closed", "false"), ("limit", &max_markets.to_string())])
            .send()
            .await
            .map_err(|e| EngineError::transient(COMPONENT, e))?;

        if !resp.status().is_success() {
            return Err(EngineError::upstream_rejection(COMPONENT, format!("gamma returned {}", resp.status())));
        }

        let raw: Vec<GammaMarket> = resp.json().await.map_err(|e| EngineError::data_shape(COMPONENT, e.to_string()))?;
        Ok(raw.into_iter().map(Self::parse).filter(|m| m.volume >= min_volume).take(max_markets).collect())
    }

    async fn market_by_id(&self, id: &str) -> EngineResult<Option<Market>> {
        let url = format!("{}/markets/{}", self.base_url, id);
        let resp = self.client.get(&url).send().await.map_err(|e| EngineError::transient(COMPONENT, e))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(EngineError::upstream_rejection(COMPONENT, format!("gamma returned {}", resp.status())));
        }
        let raw: GammaMarket = resp.json().await.map_err(|e| EngineError::data_shape(COMPONENT, e.to_string()))?;
        Ok(Some(Self::parse(raw)))
    }

    async fn health_check(&self) -> EngineResult<PortHealth> {
        let url = format!("{}/markets", self.base_url);
        match self.client.get(&url).query(&[("limit", "1")]).send().await {
            Ok(resp) if resp.status().is_success() => Ok(PortHealth { healthy: true, details: "gamma reachable".into() }),
            Ok(resp) => Ok(PortHealth { healthy: false, details: format!("gamma returned {}", resp.status()) }),
            Err(e) => Ok(PortHealth { healthy: false, details: e.to_string() }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClobBookLevel {
    price: String,
    size: String,
}

#[derive(Debug, Deserialize)]
struct ClobBook {
    #[serde(default)]
    bids: Vec<ClobBookLevel>,
    #[serde(default)]
    asks: Vec<ClobBookLevel>,
}

/// Polls the CLOB `book` endpoint at a fixed interval per subscribed market
/// instead of holding a websocket open; the engine only needs a steady
/// stream of full snapshots, not tick-level deltas (§3 Non-goals).
pub struct ClobOrderBookPoller {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl ClobOrderBookPoller {
    pub fn new(base_url: impl Into<String>, poll_interval: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url: base_url.into(), poll_interval })
    }

    async fn fetch_one(&self, market_id: &str) -> EngineResult<OrderBook> {
        let url = format!("{}/book", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("token_id", market_id)])
            .send()
            .await
            .map_err(|e| EngineError::transient(COMPONENT, e))?;
        if !resp.status().is_success() {
            return Err(EngineError::upstream_rejection(COMPONENT, format!("clob returned {}", resp.status())));
        }
        let raw: ClobBook = resp.json().await.map_err(|e| EngineError::data_shape(COMPONENT, e.to_string()))?;

        let to_levels = |levels: Vec<ClobBookLevel>| -> Vec<OrderBookLevel> {
            levels
                .into_iter()
                .filter_map(|l| Some(OrderBookLevel { price: l.price.parse().ok()?, size: l.size.parse().ok()? }))
                .collect()
        };

        Ok(OrderBook { market_id: market_id.to_string(), t: Utc::now(), bids: to_levels(raw.bids), asks: to_levels(raw.asks) })
    }
}

#[async_trait]
impl LiveOrderBookPort for ClobOrderBookPoller {
    async fn subscribe(&self, market_ids: &[String]) -> EngineResult<mpsc::Receiver<OrderBook>> {
        let (tx, rx) = mpsc::channel(256);
        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let poll_interval = self.poll_interval;
        let market_ids = market_ids.to_vec();

        tokio::spawn(async move {
            let poller = ClobOrderBookPoller { client, base_url, poll_interval };
            loop {
                for id in &market_ids {
                    match poller.fetch_one(id).await {
                        Ok(book) => {
                            if book.validate().is_err() {
                                warn!("⚠️ dropping malformed order book for {id}");
                                continue;
                            }
                            if tx.send(book).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("⚠️ order book poll failed for {id}: {e}"),
                    }
                }
                tokio::time::sleep(poller.poll_interval).await;
            }
        });

        Ok(rx)
    }
}

/// Discord-compatible webhook transport; `deliver` is purely a transport —
/// retry policy lives in the notification formatter (C11).
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl WebhookPort for DiscordWebhook {
    async fn deliver(&self, payload: serde_json::Value, deadline: Duration) -> EngineResult<()> {
        let resp = self
            .client
            .post(&self.url)
            .timeout(deadline)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::transient(COMPONENT, e))?;

        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }
        if resp.status().as_u16() == 429 {
            return Err(EngineError::transient(COMPONENT, anyhow::anyhow!("rate limited by webhook endpoint")));
        }
        Err(EngineError::upstream_rejection(COMPONENT, format!("webhook returned {}", resp.status())))
    }
}

/// Logs signals to stdout instead of a real store; used when no database
/// is configured (§9 Open Question (b): persistence is optional).
pub struct LoggingPersistentStore;

#[async_trait]
impl crate::ports::PersistentStorePort for LoggingPersistentStore {
    async fn save_signal(&self, signal: &Signal) -> EngineResult<()> {
        tracing::debug!(market_id = %signal.market_id, signal_type = signal.signal_type(), "signal (no store configured)");
        Ok(())
    }

    async fn price_history(&self, _market_id: &str, _hours: u32) -> EngineResult<Vec<f64>> {
        Ok(Vec::new())
    }

    async fn save_backtest_results(&self, _payload: &serde_json::Value) -> EngineResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> EngineResult<PortHealth> {
        Ok(PortHealth { healthy: true, details: "logging store (no persistence)".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_market_parses_json_encoded_arrays() {
        let raw = GammaMarket {
            id: "m1".into(),
            question: "Will it happen?".into(),
            description: "".into(),
            outcomes: r#"["Yes","No"]"#.into(),
            outcome_prices: r#"["0.6","0.4"]"#.into(),
            volume_24hr: Some(12345.0),
            volume: None,
            active: true,
            closed: false,
        };
        let market = GammaMarketCatalog::parse(raw);
        assert_eq!(market.outcomes, vec!["Yes", "No"]);
        assert_eq!(market.outcome_prices, vec![0.6, 0.4]);
        assert_eq!(market.volume, 12345.0);
    }
}
