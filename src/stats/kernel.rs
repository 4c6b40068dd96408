//! Statistical kernel (C2): univariate stats, z-scores, trend, volatility,
//! change-point detection, correlation, market health — all keyed per
//! (market, metric) so every caller shares the same rolling history.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::ring_buffer::RingBuffer;

const DEFAULT_WINDOW: usize = 720;
const EWMA_LAMBDA: f64 = 0.94;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub median: f64,
    pub p5: f64,
    pub p95: f64,
    pub n: usize,
    pub significant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScoreResult {
    pub z: f64,
    pub p_value: f64,
    pub is_anomaly: bool,
    pub confidence: f64,
    pub std_error: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone)]
pub struct TrendResult {
    pub direction: TrendDirection,
    pub slope: f64,
    pub r_squared: f64,
    pub significance: f64,
    pub change_points: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityResult {
    pub historical: f64,
    pub ewma: f64,
    pub parkinson: f64,
    pub garman_klass: f64,
    pub vol_of_vol: f64,
    pub ratio: f64,
}

/// Minimum sample size below which results degrade to the neutral values
/// mandated by §7 ("no signal", not an error).
const MIN_SAMPLE: usize = 30;

/// Per-(market, metric) statistical kernel. Internally a map of ring
/// buffers guarded by a single lock, matching the teacher's
/// `parking_lot::RwLock` convention for short critical sections.
pub struct StatisticalKernel {
    window: usize,
    min_sample: usize,
    series: RwLock<HashMap<(String, String), RingBuffer>>,
}

impl StatisticalKernel {
    pub fn new(window: usize, min_sample: usize) -> Self {
        Self {
            window: if window == 0 { DEFAULT_WINDOW } else { window },
            min_sample: if min_sample == 0 { MIN_SAMPLE } else { min_sample },
            series: RwLock::new(HashMap::new()),
        }
    }

    fn key(market_id: &str, metric: &str) -> (String, String) {
        (market_id.to_string(), metric.to_string())
    }

    pub fn add_data_point(&self, market_id: &str, metric: &str, value: f64) {
        let mut series = self.series.write();
        series
            .entry(Self::key(market_id, metric))
            .or_insert_with(|| RingBuffer::new(self.window))
            .push(value);
    }

    fn history(&self, market_id: &str, metric: &str) -> Vec<f64> {
        self.series
            .read()
            .get(&Self::key(market_id, metric))
            .map(|rb| rb.all())
            .unwrap_or_default()
    }

    /// Univariate statistics over an arbitrary data slice — stateless, so
    /// callers may feed it directly without going through `add_data_point`.
    pub fn statistics(data: &[f64]) -> Statistics {
        let n = data.len();
        if n == 0 {
            return Statistics {
                mean: 0.0,
                std_dev: 0.0,
                variance: 0.0,
                skewness: 0.0,
                kurtosis: 3.0,
                median: 0.0,
                p5: 0.0,
                p95: 0.0,
                n: 0,
                significant: false,
            };
        }

        let mean = data.iter().sum::<f64>() / n as f64;
        let variance = if n < 2 {
            0.0
        } else {
            data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0)
        };
        let std_dev = variance.sqrt();

        let skewness = if std_dev == 0.0 || n < 3 {
            0.0
        } else {
            let m3 = data.iter().map(|x| ((x - mean) / std_dev).powi(3)).sum::<f64>() / n as f64;
            m3
        };

        let kurtosis = if std_dev == 0.0 || n < 4 {
            3.0
        } else {
            data.iter().map(|x| ((x - mean) / std_dev).powi(4)).sum::<f64>() / n as f64
        };

        let mut sorted = data.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = percentile(&sorted, 0.5);
        let p5 = percentile(&sorted, 0.05);
        let p95 = percentile(&sorted, 0.95);

        Statistics {
            mean,
            std_dev,
            variance,
            skewness,
            kurtosis,
            median,
            p5,
            p95,
            n,
            significant: n >= MIN_SAMPLE,
        }
    }

    fn neutral_z() -> ZScoreResult {
        ZScoreResult {
            z: 0.0,
            p_value: 1.0,
            is_anomaly: false,
            confidence: 0.0,
            std_error: 0.0,
        }
    }

    pub fn z_score(&self, market_id: &str, metric: &str, value: f64) -> ZScoreResult {
        self.time_adjusted_z_score(market_id, metric, value, 1.0)
    }

    /// `t` is a recency weight in `(0, 1]`; 1.0 means no decay applied (the
    /// plain z-score). Values `<1` widen the implied standard error,
    /// matching the teacher's intuition that sparse/old history should
    /// count for less.
    pub fn time_adjusted_z_score(&self, market_id: &str, metric: &str, value: f64, t: f64) -> ZScoreResult {
        let history = self.history(market_id, metric);
        if history.len() < self.min_sample {
            return Self::neutral_z();
        }
        let stats = Self::statistics(&history);
        if stats.std_dev == 0.0 {
            return Self::neutral_z();
        }

        let t = t.clamp(1e-6, 1.0);
        let std_error = stats.std_dev / t.sqrt();
        let z = (value - stats.mean) / std_error;
        let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));
        let confidence = (1.0 - p_value).clamp(0.0, 1.0);

        ZScoreResult {
            z,
            p_value,
            is_anomaly: p_value < 0.05,
            confidence,
            std_error,
        }
    }

    pub fn trend(&self, market_id: &str, metric: &str) -> TrendResult {
        let history = self.history(market_id, metric);
        Self::trend_of(&history)
    }

    fn trend_of(history: &[f64]) -> TrendResult {
        let n = history.len();
        if n < MIN_SAMPLE {
            return TrendResult {
                direction: TrendDirection::Flat,
                slope: 0.0,
                r_squared: 0.0,
                significance: 0.0,
                change_points: Vec::new(),
            };
        }

        let (slope, intercept, r_squared) = ols(history);
        let direction = if slope.abs() < 1e-9 {
            TrendDirection::Flat
        } else if slope > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };

        let residual_std = {
            let residuals: Vec<f64> = history
                .iter()
                .enumerate()
                .map(|(i, y)| y - (intercept + slope * i as f64))
                .collect();
            Self::statistics(&residuals).std_dev
        };
        let se_slope = if residual_std == 0.0 {
            0.0
        } else {
            residual_std / ((n as f64).sqrt() * Self::statistics(history).std_dev.max(1e-12))
        };
        let t_stat = if se_slope == 0.0 { 0.0 } else { slope / se_slope };
        let significance = 2.0 * (1.0 - normal_cdf(t_stat.abs()));

        TrendResult {
            direction,
            slope,
            r_squared,
            significance,
            change_points: detect_change_points(history),
        }
    }

    pub fn detect_structural_breaks(&self, market_id: &str, metric: &str) -> Vec<usize> {
        detect_change_points(&self.history(market_id, metric))
    }

    /// Historical / EWMA / Parkinson / Garman-Klass volatility, vol-of-vol,
    /// and the ratio of EWMA to historical. `highs`/`lows`/`opens` are
    /// optional — Parkinson and Garman-Klass degrade to the historical
    /// estimate when absent.
    pub fn volatility(
        &self,
        _market_id: &str,
        prices: &[f64],
        highs: Option<&[f64]>,
        lows: Option<&[f64]>,
        opens: Option<&[f64]>,
    ) -> VolatilityResult {
        if prices.len() < 2 {
            return VolatilityResult {
                historical: 0.0,
                ewma: 0.0,
                parkinson: 0.0,
                garman_klass: 0.0,
                vol_of_vol: 0.0,
                ratio: 1.0,
            };
        }

        let returns: Vec<f64> = prices
            .windows(2)
            .map(|w| if w[0] != 0.0 { (w[1] / w[0]).ln() } else { 0.0 })
            .collect();

        let historical = Self::statistics(&returns).std_dev;

        let mut ewma_var = returns.first().copied().unwrap_or(0.0).powi(2);
        for r in returns.iter().skip(1) {
            ewma_var = EWMA_LAMBDA * ewma_var + (1.0 - EWMA_LAMBDA) * r.powi(2);
        }
        let ewma = ewma_var.sqrt();

        let parkinson = match (highs, lows) {
            (Some(h), Some(l)) if h.len() == l.len() && !h.is_empty() => {
                let n = h.len() as f64;
                let sum: f64 = h
                    .iter()
                    .zip(l.iter())
                    .map(|(hi, lo)| {
                        if *hi > 0.0 && *lo > 0.0 {
                            (hi / lo).ln().powi(2)
                        } else {
                            0.0
                        }
                    })
                    .sum();
                (sum / (4.0 * n * 2f64.ln())).sqrt()
            }
            _ => historical,
        };

        let garman_klass = match (highs, lows, opens) {
            (Some(h), Some(l), Some(o)) if h.len() == l.len() && l.len() == o.len() && !h.is_empty() => {
                let n = h.len() as f64;
                let sum: f64 = h
                    .iter()
                    .zip(l.iter())
                    .zip(o.iter().zip(prices.iter()))
                    .map(|((hi, lo), (op, cl))| {
                        if *hi <= 0.0 || *lo <= 0.0 || *op <= 0.0 || *cl <= 0.0 {
                            return 0.0;
                        }
                        let hl = 0.5 * (hi / lo).ln().powi(2);
                        let co = (2.0 * 2f64.ln() - 1.0) * (cl / op).ln().powi(2);
                        hl - co
                    })
                    .sum();
                (sum / n).max(0.0).sqrt()
            }
            _ => historical,
        };

        let vol_of_vol = if returns.len() >= MIN_SAMPLE {
            let rolling: Vec<f64> = returns
                .windows(10.min(returns.len()))
                .map(|w| Self::statistics(w).std_dev)
                .collect();
            Self::statistics(&rolling).std_dev
        } else {
            0.0
        };

        let ratio = if historical > 0.0 { ewma / historical } else { 1.0 };

        VolatilityResult {
            historical,
            ewma,
            parkinson,
            garman_klass,
            vol_of_vol,
            ratio,
        }
    }

    pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
        pearson(x, y)
    }

    pub fn rank_correlation(x: &[f64], y: &[f64]) -> f64 {
        pearson(&to_ranks(x), &to_ranks(y))
    }

    /// Composite health score in `[0, 100]`: rewards stable, low-volatility,
    /// trend-consistent history; penalizes thin samples.
    pub fn market_health_score(&self, market_id: &str, metric: &str) -> f64 {
        let history = self.history(market_id, metric);
        if history.len() < self.min_sample {
            return 50.0;
        }
        let stats = Self::statistics(&history);
        let trend = Self::trend_of(&history);

        let stability = if stats.mean.abs() > 1e-9 {
            (1.0 - (stats.std_dev / stats.mean.abs()).min(1.0)) * 40.0
        } else {
            20.0
        };
        let consistency = trend.r_squared.clamp(0.0, 1.0) * 30.0;
        let sample_bonus = (stats.n as f64 / self.window as f64).min(1.0) * 30.0;

        (stability + consistency + sample_bonus).clamp(0.0, 100.0)
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = q * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = idx - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Abramowitz-Stegun rational approximation of the standard normal CDF.
fn normal_cdf(x: f64) -> f64 {
    let b1 = 0.319381530;
    let b2 = -0.356563782;
    let b3 = 1.781477937;
    let b4 = -1.821255978;
    let b5 = 1.330274429;
    let p = 0.2316419;
    let c = 0.39894228;

    if x >= 0.0 {
        let t = 1.0 / (1.0 + p * x);
        1.0 - c * (-x * x / 2.0).exp() * t * (t * (t * (t * (t * b5 + b4) + b3) + b2) + b1)
    } else {
        1.0 - normal_cdf(-x)
    }
}

fn ols(y: &[f64]) -> (f64, f64, f64) {
    let n = y.len() as f64;
    let xs: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (xi, yi) in xs.iter().zip(y.iter()) {
        sxy += (xi - x_mean) * (yi - y_mean);
        sxx += (xi - x_mean).powi(2);
    }
    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    let intercept = y_mean - slope * x_mean;

    let ss_tot: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();
    let ss_res: f64 = xs
        .iter()
        .zip(y.iter())
        .map(|(xi, yi)| (yi - (intercept + slope * xi)).powi(2))
        .sum();
    let r_squared = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    (slope, intercept, r_squared.clamp(0.0, 1.0))
}

/// Sliding-window mean/variance break test per §4.2.
fn detect_change_points(history: &[f64]) -> Vec<usize> {
    const WINDOW: usize = 20;
    if history.len() < WINDOW * 2 {
        return Vec::new();
    }

    let mut points = Vec::new();
    for i in WINDOW..history.len() - WINDOW {
        let before = &history[i - WINDOW..i];
        let after = &history[i..i + WINDOW];
        let s_before = StatisticalKernel::statistics(before);
        let s_after = StatisticalKernel::statistics(after);

        let pooled_std = ((s_before.variance + s_after.variance) / 2.0).sqrt();
        let mean_break = pooled_std > 0.0 && (s_after.mean - s_before.mean).abs() > 2.0 * pooled_std;
        let var_break = s_before.variance > 0.0 && (s_after.variance - s_before.variance).abs() > 2.0 * s_before.variance;

        if mean_break || var_break {
            points.push(i);
        }
    }
    points
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let x = &x[..n];
    let y = &y[..n];
    let x_mean = x.iter().sum::<f64>() / n as f64;
    let y_mean = y.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut dx2 = 0.0;
    let mut dy2 = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        num += dx * dy;
        dx2 += dx * dx;
        dy2 += dy * dy;
    }
    let denom = (dx2 * dy2).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (num / denom).clamp(-1.0, 1.0)
    }
}

fn to_ranks(data: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..data.len()).collect();
    idx.sort_by(|&a, &b| data[a].partial_cmp(&data[b]).unwrap());

    let mut ranks = vec![0.0; data.len()];
    let mut i = 0;
    while i < idx.len() {
        let mut j = i;
        while j + 1 < idx.len() && data[idx[j + 1]] == data[idx[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[idx[k]] = avg_rank;
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_of_empty_is_neutral() {
        let s = StatisticalKernel::statistics(&[]);
        assert_eq!(s.n, 0);
        assert_eq!(s.kurtosis, 3.0);
        assert!(!s.significant);
    }

    #[test]
    fn z_score_neutral_below_min_sample() {
        let kernel = StatisticalKernel::new(100, 30);
        for i in 0..10 {
            kernel.add_data_point("m1", "volume", 100.0 + i as f64);
        }
        let z = kernel.z_score("m1", "volume", 500.0);
        assert_eq!(z.z, 0.0);
        assert_eq!(z.p_value, 1.0);
        assert!(!z.is_anomaly);
    }

    #[test]
    fn z_score_flags_outlier_with_enough_history() {
        let kernel = StatisticalKernel::new(200, 30);
        for _ in 0..100 {
            kernel.add_data_point("m1", "volume", 100.0);
        }
        let z = kernel.z_score("m1", "volume", 10_000.0);
        assert!(z.z > 5.0);
        assert!(z.is_anomaly);
    }

    #[test]
    fn zero_variance_series_never_anomalous() {
        let kernel = StatisticalKernel::new(100, 30);
        for _ in 0..50 {
            kernel.add_data_point("m1", "spread", 5.0);
        }
        let z = kernel.z_score("m1", "spread", 5.0);
        assert_eq!(z.z, 0.0);
        assert!(!z.is_anomaly);
    }

    #[test]
    fn trend_detects_upward_slope() {
        let kernel = StatisticalKernel::new(200, 30);
        for i in 0..60 {
            kernel.add_data_point("m1", "volume", i as f64 * 2.0);
        }
        let t = kernel.trend("m1", "volume");
        assert_eq!(t.direction, TrendDirection::Up);
        assert!(t.slope > 0.0);
    }

    #[test]
    fn correlation_of_identical_series_is_one() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert!((StatisticalKernel::correlation(&x, &x) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rank_correlation_tolerates_ties() {
        let x = vec![1.0, 2.0, 2.0, 3.0];
        let y = vec![1.0, 2.0, 2.0, 3.0];
        assert!((StatisticalKernel::rank_correlation(&x, &y) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn volatility_degrades_gracefully_on_short_series() {
        let kernel = StatisticalKernel::new(100, 30);
        let v = kernel.volatility("m1", &[100.0], None, None, None);
        assert_eq!(v.historical, 0.0);
        assert_eq!(v.ratio, 1.0);
    }
}
