//! Order-book microstructure analyzer (C4): depth, micro-price drift,
//! imbalance, spread, liquidity-vacuum detection, time-of-day baselines.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Timelike;
use parking_lot::RwLock;

use crate::models::{OrderBook, Severity, Signal, SignalPayload};
use crate::stats::{RingBuffer, StatisticalKernel};

const DEPTH_WINDOW: usize = 720;
const MICRO_PRICE_WINDOW: usize = 50;
const MICRO_PRICE_SLOPE_WINDOW: usize = 20;
const LIQUIDITY_VACUUM_DEPTH_DROP: f64 = 0.40;
const LIQUIDITY_VACUUM_SPREAD_STABILITY: f64 = 0.10;

#[derive(Debug, Clone, Copy, Default)]
struct HourlyBaseline {
    n: u64,
    mean_volume: f64,
    mean_depth: f64,
    mean_spread: f64,
    mean_abs_imbalance: f64,
}

impl HourlyBaseline {
    fn update(&mut self, volume: f64, depth: f64, spread: f64, imbalance: f64) {
        self.n += 1;
        let k = self.n as f64;
        self.mean_volume += (volume - self.mean_volume) / k;
        self.mean_depth += (depth - self.mean_depth) / k;
        self.mean_spread += (spread - self.mean_spread) / k;
        self.mean_abs_imbalance += (imbalance.abs() - self.mean_abs_imbalance) / k;
    }
}

struct MarketState {
    depth_history: RingBuffer,
    micro_price_history: RingBuffer,
    last_depth: Option<f64>,
    last_spread_bps: Option<f64>,
    hourly: [HourlyBaseline; 24],
}

impl MarketState {
    fn new() -> Self {
        Self {
            depth_history: RingBuffer::new(DEPTH_WINDOW),
            micro_price_history: RingBuffer::new(MICRO_PRICE_WINDOW),
            last_depth: None,
            last_spread_bps: None,
            hourly: [HourlyBaseline::default(); 24],
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnhancedMicrostructureMetrics {
    pub market_id: String,
    pub depth: f64,
    pub depth_change_pct: f64,
    pub depth_baseline: f64,
    pub micro_price: f64,
    pub micro_price_slope: f64,
    pub micro_price_drift: f64,
    pub imbalance: f64,
    pub spread_bps: f64,
    pub spread_change_pct: f64,
    pub liquidity_vacuum: bool,
    pub z_scores: Vec<(String, f64)>,
}

pub struct MicrostructureAnalyzer {
    kernel: Arc<StatisticalKernel>,
    markets: RwLock<HashMap<String, MarketState>>,
}

impl MicrostructureAnalyzer {
    pub fn new(kernel: Arc<StatisticalKernel>) -> Self {
        Self {
            kernel,
            markets: RwLock::new(HashMap::new()),
        }
    }

    /// Process one order-book event. Returns the metrics bundle and, when
    /// a z-score or liquidity-vacuum condition fires, a microstructure
    /// signal — callers are responsible for per-market dedup.
    pub fn on_order_book_event(&self, book: &OrderBook) -> (EnhancedMicrostructureMetrics, Option<Signal>) {
        let mut markets = self.markets.write();
        let state = markets
            .entry(book.market_id.clone())
            .or_insert_with(MarketState::new);

        let depth = book.depth_at(0);
        state.depth_history.push(depth);
        let depth_baseline = StatisticalKernel::statistics(&state.depth_history.all()).mean;
        let depth_change_pct = match state.last_depth {
            Some(prev) if prev != 0.0 => (depth - prev) / prev,
            _ => 0.0,
        };

        let micro_price = book.micro_price(3).unwrap_or(0.0);
        state.micro_price_history.push(micro_price);
        let mp_history = state.micro_price_history.last(MICRO_PRICE_SLOPE_WINDOW);
        let micro_price_slope = ols_slope(&mp_history);

        let diffs: Vec<f64> = mp_history.windows(2).map(|w| w[1] - w[0]).collect();
        let p95 = {
            let mut sorted = diffs.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            if sorted.is_empty() {
                0.0
            } else {
                let idx = ((sorted.len() - 1) as f64 * 0.95).round() as usize;
                sorted[idx]
            }
        };
        let last_diff = diffs.last().copied().unwrap_or(0.0);
        let micro_price_drift = (last_diff - p95).max(0.0);

        let imbalance = book.imbalance(3);
        let spread_bps = book.spread_bps().unwrap_or(0.0);
        let spread_change_pct = match state.last_spread_bps {
            Some(prev) if prev != 0.0 => (spread_bps - prev) / prev,
            _ => 0.0,
        };

        self.kernel.add_data_point(&book.market_id, "depth", depth);
        self.kernel.add_data_point(&book.market_id, "spread", spread_bps);
        self.kernel.add_data_point(&book.market_id, "imbalance", imbalance);
        self.kernel.add_data_point(&book.market_id, "micro_price", micro_price);

        let mut z_scores = Vec::new();
        let mut any_anomalous = false;
        for metric in ["depth", "spread", "imbalance", "micro_price"] {
            let value = match metric {
                "depth" => depth,
                "spread" => spread_bps,
                "imbalance" => imbalance,
                _ => micro_price,
            };
            let z = self.kernel.z_score(&book.market_id, metric, value);
            if z.is_anomaly {
                any_anomalous = true;
            }
            z_scores.push((metric.to_string(), z.z));
        }

        let liquidity_vacuum = state
            .last_depth
            .map(|prev| prev > 0.0 && (prev - depth) / prev > LIQUIDITY_VACUUM_DEPTH_DROP)
            .unwrap_or(false)
            && spread_change_pct.abs() < LIQUIDITY_VACUUM_SPREAD_STABILITY;

        let hour = book.t.hour() as usize;
        state.hourly[hour].update(depth, depth, spread_bps, imbalance);

        state.last_depth = Some(depth);
        state.last_spread_bps = Some(spread_bps);

        let metrics = EnhancedMicrostructureMetrics {
            market_id: book.market_id.clone(),
            depth,
            depth_change_pct,
            depth_baseline,
            micro_price,
            micro_price_slope,
            micro_price_drift,
            imbalance,
            spread_bps,
            spread_change_pct,
            liquidity_vacuum,
            z_scores: z_scores.clone(),
        };

        let signal = if any_anomalous || liquidity_vacuum {
            let severity = if liquidity_vacuum && any_anomalous {
                Severity::High
            } else if liquidity_vacuum {
                Severity::Medium
            } else {
                Severity::Low
            };
            Some(Signal::new(
                book.market_id.clone(),
                String::new(),
                0.5,
                SignalPayload::Microstructure {
                    z_scores,
                    liquidity_vacuum,
                    severity,
                },
            ))
        } else {
            None
        };

        (metrics, signal)
    }

    pub fn hourly_baseline(&self, market_id: &str, hour: u32) -> Option<(f64, f64, f64, f64)> {
        let markets = self.markets.read();
        let state = markets.get(market_id)?;
        let b = state.hourly[hour as usize % 24];
        if b.n == 0 {
            None
        } else {
            Some((b.mean_volume, b.mean_depth, b.mean_spread, b.mean_abs_imbalance))
        }
    }
}

fn ols_slope(y: &[f64]) -> f64 {
    let n = y.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / n_f;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, yi) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (yi - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn level(price: f64, size: f64) -> crate::models::OrderBookLevel {
        crate::models::OrderBookLevel { price, size }
    }

    fn book(market_id: &str, bid_size: f64, ask_size: f64, bid: f64, ask: f64) -> OrderBook {
        OrderBook {
            market_id: market_id.into(),
            t: Utc::now(),
            bids: vec![level(bid, bid_size)],
            asks: vec![level(ask, ask_size)],
        }
    }

    #[test]
    fn liquidity_vacuum_fires_on_depth_drop_without_spread_widening() {
        let analyzer = MicrostructureAnalyzer::new(Arc::new(StatisticalKernel::new(200, 30)));
        analyzer.on_order_book_event(&book("m1", 1000.0, 1000.0, 0.49, 0.51));
        let (metrics, _) = analyzer.on_order_book_event(&book("m1", 100.0, 100.0, 0.49, 0.51));
        assert!(metrics.liquidity_vacuum);
    }

    #[test]
    fn no_vacuum_when_spread_widens_alongside_depth_drop() {
        let analyzer = MicrostructureAnalyzer::new(Arc::new(StatisticalKernel::new(200, 30)));
        analyzer.on_order_book_event(&book("m1", 1000.0, 1000.0, 0.49, 0.51));
        let (metrics, _) = analyzer.on_order_book_event(&book("m1", 100.0, 100.0, 0.30, 0.70));
        assert!(!metrics.liquidity_vacuum);
    }
}
