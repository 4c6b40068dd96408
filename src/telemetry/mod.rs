//! Metrics and health surface (C13): counters/gauges/histograms keyed by
//! name + tag set, a threshold monitor, and the HTTP health/metrics
//! surface consumed by process supervision.

pub mod health;
pub mod histogram;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram as metrics_histogram};
use parking_lot::RwLock;

pub use histogram::LatencyHistogram;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdLevel {
    Ok,
    Warn,
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct Threshold {
    pub warn: f64,
    pub critical: f64,
    /// Inverted metrics (e.g. health score) alert when the value drops
    /// *below* the threshold rather than rising above it.
    pub inverted: bool,
}

impl Threshold {
    pub fn evaluate(&self, value: f64) -> ThresholdLevel {
        if self.inverted {
            if value <= self.critical {
                ThresholdLevel::Critical
            } else if value <= self.warn {
                ThresholdLevel::Warn
            } else {
                ThresholdLevel::Ok
            }
        } else if value >= self.critical {
            ThresholdLevel::Critical
        } else if value >= self.warn {
            ThresholdLevel::Warn
        } else {
            ThresholdLevel::Ok
        }
    }
}

struct ErrorWindow {
    timestamps: Vec<DateTime<Utc>>,
}

impl ErrorWindow {
    fn new() -> Self {
        Self { timestamps: Vec::new() }
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.timestamps.push(now);
        self.trim(now);
    }

    fn trim(&mut self, now: DateTime<Utc>) {
        self.timestamps.retain(|t| now - *t < chrono::Duration::minutes(1));
    }

    fn rate_per_min(&mut self, now: DateTime<Utc>) -> f64 {
        self.trim(now);
        self.timestamps.len() as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct BusinessCounters {
    pub markets_tracked: u64,
    pub signals_generated: u64,
    pub anomalies_detected: u64,
    pub alerts_sent: u64,
}

/// Process-wide metrics registry. Counters/gauges/histograms are exported
/// through the `metrics` facade (Prometheus exposition via
/// `metrics-exporter-prometheus` in `main.rs`); this struct additionally
/// tracks the application-level business counters and threshold state the
/// spec's health surface needs.
pub struct MetricsRegistry {
    started_at: Instant,
    thresholds: HashMap<&'static str, Threshold>,
    error_window: RwLock<ErrorWindow>,
    markets_tracked: AtomicU64,
    signals_generated: AtomicU64,
    anomalies_detected: AtomicU64,
    alerts_sent: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut thresholds = HashMap::new();
        thresholds.insert("cpu_pct", Threshold { warn: 70.0, critical: 90.0, inverted: false });
        thresholds.insert("memory_pct", Threshold { warn: 75.0, critical: 90.0, inverted: false });
        thresholds.insert("event_loop_lag_ms", Threshold { warn: 100.0, critical: 500.0, inverted: false });
        thresholds.insert("health_score", Threshold { warn: 50.0, critical: 25.0, inverted: true });
        thresholds.insert("error_rate_per_min", Threshold { warn: 5.0, critical: 20.0, inverted: false });

        Self {
            started_at: Instant::now(),
            thresholds,
            error_window: RwLock::new(ErrorWindow::new()),
            markets_tracked: AtomicU64::new(0),
            signals_generated: AtomicU64::new(0),
            anomalies_detected: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn record_error(&self, component: &'static str) {
        counter!("errors_total", "component" => component).increment(1);
        self.error_window.write().record(Utc::now());
    }

    pub fn error_rate_per_min(&self) -> f64 {
        self.error_window.write().rate_per_min(Utc::now())
    }

    pub fn set_markets_tracked(&self, n: u64) {
        self.markets_tracked.store(n, Ordering::Relaxed);
        gauge!("markets_tracked").set(n as f64);
    }

    pub fn incr_signals_generated(&self, signal_type: &'static str) {
        self.signals_generated.fetch_add(1, Ordering::Relaxed);
        counter!("signals_generated_total", "signal_type" => signal_type).increment(1);
    }

    pub fn incr_anomalies_detected(&self) {
        self.anomalies_detected.fetch_add(1, Ordering::Relaxed);
        counter!("anomalies_detected_total").increment(1);
    }

    pub fn incr_alerts_sent(&self, priority: &'static str) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);
        counter!("alerts_sent_total", "priority" => priority).increment(1);
    }

    pub fn record_response_time(&self, component: &'static str, ms: f64) {
        metrics_histogram!("response_time_ms", "component" => component).record(ms);
    }

    pub fn business_counters(&self) -> BusinessCounters {
        BusinessCounters {
            markets_tracked: self.markets_tracked.load(Ordering::Relaxed),
            signals_generated: self.signals_generated.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies_detected.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
        }
    }

    /// Evaluates every tracked metric against its threshold and returns
    /// the ones at `Warn` or `Critical`. Never decides remediation.
    pub fn check_thresholds(&self, values: &HashMap<&'static str, f64>) -> Vec<(&'static str, ThresholdLevel)> {
        let mut breaches = Vec::new();
        for (name, threshold) in &self.thresholds {
            if let Some(value) = values.get(name) {
                let level = threshold.evaluate(*value);
                if level != ThresholdLevel::Ok {
                    breaches.push((*name, level));
                }
            }
        }
        breaches
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_threshold_alerts_on_low_health_score() {
        let t = Threshold { warn: 50.0, critical: 25.0, inverted: true };
        assert_eq!(t.evaluate(80.0), ThresholdLevel::Ok);
        assert_eq!(t.evaluate(40.0), ThresholdLevel::Warn);
        assert_eq!(t.evaluate(10.0), ThresholdLevel::Critical);
    }

    #[test]
    fn error_rate_window_expires_after_one_minute() {
        let mut window = ErrorWindow::new();
        let t0 = Utc::now();
        window.record(t0);
        assert_eq!(window.rate_per_min(t0), 1.0);
        assert_eq!(window.rate_per_min(t0 + chrono::Duration::minutes(2)), 0.0);
    }

    #[test]
    fn business_counters_increment() {
        let registry = MetricsRegistry::new();
        registry.incr_signals_generated("volume_spike");
        registry.incr_alerts_sent("high");
        let counters = registry.business_counters();
        assert_eq!(counters.signals_generated, 1);
        assert_eq!(counters.alerts_sent, 1);
    }
}
