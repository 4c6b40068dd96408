//! Notification formatter (C11): priority-styled embed rendering and a
//! retrying webhook dispatcher.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use crate::models::{Market, Priority, Signal, SignalPayload};
use crate::ports::{PerformanceTrackingPort, WebhookPort};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const PER_ATTEMPT_DEADLINE: Duration = Duration::from_secs(10);
const TITLE_MAX_CHARS: usize = 200;

fn priority_color(priority: Priority) -> u32 {
    match priority {
        Priority::Critical => 0xFF0000,
        Priority::High => 0xFF8C00,
        Priority::Medium => 0xFFD700,
        Priority::Low => 0x808080,
    }
}

fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "🔴",
        Priority::High => "🟠",
        Priority::Medium => "🟡",
        Priority::Low => "⚪",
    }
}

fn interpret(signal: &Signal) -> String {
    match &signal.payload {
        SignalPayload::VolumeSpike { current_volume, spike_multiplier } => {
            format!("Volume jumped to ${current_volume:.0} ({spike_multiplier:.1}x baseline).")
        }
        SignalPayload::PriceMovement { outcome_index, price_change_pct, .. } => {
            format!("Outcome #{outcome_index} moved {price_change_pct:.1}%.")
        }
        SignalPayload::NewMarket { activity_score } => {
            format!("New market, activity score {activity_score:.0}.")
        }
        SignalPayload::ActivitySurge { activity_score } => {
            format!("Activity surged to {activity_score:.0}.")
        }
        SignalPayload::Microstructure { liquidity_vacuum, .. } => {
            if *liquidity_vacuum {
                "Order-book depth evaporated without the spread widening.".to_string()
            } else {
                "Order-book metrics crossed their anomaly threshold.".to_string()
            }
        }
        SignalPayload::CoordinatedCrossMarket { members, avg_change_pct, .. } => {
            format!("{} correlated markets moved {avg_change_pct:.1}% together.", members.len())
        }
        SignalPayload::FrontRunning { leak_probability, time_to_news_minutes, .. } => {
            format!("Leak probability {:.0}%, est. {:.0} min to news.", leak_probability * 100.0, time_to_news_minutes)
        }
        SignalPayload::Anomaly { explanation, .. } => explanation.clone(),
    }
}

fn red_flags(signal: &Signal) -> Vec<&'static str> {
    match &signal.payload {
        SignalPayload::Microstructure { liquidity_vacuum: true, .. } => {
            vec!["thin book, expect slippage", "confirm before sizing up"]
        }
        SignalPayload::FrontRunning { .. } => vec!["possible informed trading ahead of news"],
        SignalPayload::CoordinatedCrossMarket { .. } => vec!["verify this isn't a single shared news event"],
        _ => vec!["corroborate with a second signal before acting"],
    }
}

pub struct NotificationFormatter<'a> {
    webhook: &'a dyn WebhookPort,
    performance: &'a dyn PerformanceTrackingPort,
}

impl<'a> NotificationFormatter<'a> {
    pub fn new(webhook: &'a dyn WebhookPort, performance: &'a dyn PerformanceTrackingPort) -> Self {
        Self { webhook, performance }
    }

    pub async fn render(
        &self,
        signal: &Signal,
        market: &Market,
        priority: Priority,
        opportunity_score: f64,
        market_url: &str,
    ) -> Value {
        let title: String = market.question.chars().take(TITLE_MAX_CHARS).collect();

        let mut embed = json!({
            "title": format!("{} {}", priority_marker(priority), title),
            "color": priority_color(priority),
            "fields": [
                {"name": "Signal", "value": signal.signal_type()},
                {"name": "Confidence", "value": format!("{:.0}%", signal.confidence * 100.0)},
                {"name": "Opportunity score", "value": format!("{opportunity_score:.1}")},
                {"name": "Category", "value": market.category.clone().unwrap_or_else(|| "uncategorized".into())},
                {"name": "Prices", "value": format_prices(&market.outcome_prices)},
                {"name": "Interpretation", "value": interpret(signal)},
                {"name": "What to watch", "value": red_flags(signal).join("; ")},
            ],
            "url": market_url,
        });

        if matches!(priority, Priority::Critical | Priority::High) {
            if let Ok(Some(stats)) = self.performance.signal_type_stats(signal.signal_type()).await {
                if let Some(fields) = embed.get_mut("fields").and_then(Value::as_array_mut) {
                    fields.push(json!({
                        "name": "Historical performance",
                        "value": format!(
                            "accuracy={:.0}% win_rate={:.0}% pnl_1h={:.2} pnl_24h={:.2} sharpe={:.2} kelly={:.2} confidence={:.0}%",
                            stats.accuracy * 100.0,
                            stats.win_rate * 100.0,
                            stats.avg_pnl_1h,
                            stats.avg_pnl_24h,
                            stats.sharpe,
                            stats.kelly_fraction,
                            stats.posterior_confidence * 100.0,
                        ),
                    }));
                }
            }
        }

        embed
    }

    /// Exponential-backoff dispatch: up to 3 retries, base delay 1s,
    /// 10s per-attempt deadline. Returns `Ok(())` on first success.
    pub async fn dispatch(&self, payload: Value) -> Result<(), String> {
        let mut attempt = 0;
        loop {
            match self.webhook.deliver(payload.clone(), PER_ATTEMPT_DEADLINE).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt > MAX_RETRIES {
                        warn!(attempts = attempt, "🛑 webhook delivery exhausted retries: {err}");
                        return Err(err.to_string());
                    }
                    let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Exercises the full render+dispatch path without a live signal, for
    /// operators verifying webhook wiring.
    pub async fn test_alert(&self) -> Result<(), String> {
        let payload = json!({
            "title": "⚪ test alert",
            "color": priority_color(Priority::Low),
            "fields": [{"name": "Note", "value": "this is a connectivity test, not a real signal"}],
        });
        self.dispatch(payload).await
    }
}

fn format_prices(prices: &[f64]) -> String {
    prices
        .iter()
        .take(5)
        .map(|p| format!("{:.0}%", p * 100.0))
        .collect::<Vec<_>>()
        .join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NullPerformanceTracker;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFailingWebhook {
        calls: AtomicU32,
        fail_times: u32,
    }

    #[async_trait]
    impl WebhookPort for CountingFailingWebhook {
        async fn deliver(&self, _payload: Value, _deadline: Duration) -> crate::error::EngineResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(crate::error::EngineError::transient("webhook", anyhow::anyhow!("simulated failure")))
            } else {
                Ok(())
            }
        }
    }

    struct AlwaysFailingWebhook;

    #[async_trait]
    impl WebhookPort for AlwaysFailingWebhook {
        async fn deliver(&self, _payload: Value, _deadline: Duration) -> crate::error::EngineResult<()> {
            Err(crate::error::EngineError::transient("webhook", anyhow::anyhow!("down")))
        }
    }

    #[tokio::test]
    async fn dispatch_succeeds_after_transient_failures() {
        let webhook = CountingFailingWebhook { calls: AtomicU32::new(0), fail_times: 2 };
        let perf = NullPerformanceTracker;
        let formatter = NotificationFormatter::new(&webhook, &perf);
        let result = formatter.dispatch(json!({"ok": true})).await;
        assert!(result.is_ok());
        assert_eq!(webhook.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dispatch_gives_up_after_max_retries() {
        let webhook = AlwaysFailingWebhook;
        let perf = NullPerformanceTracker;
        let formatter = NotificationFormatter::new(&webhook, &perf);
        let result = formatter.dispatch(json!({"ok": true})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn title_is_truncated_to_200_chars() {
        let webhook = AlwaysFailingWebhook;
        let perf = NullPerformanceTracker;
        let formatter = NotificationFormatter::new(&webhook, &perf);
        let mut market = Market::new("m1", "x".repeat(500), "d", vec!["Yes".into(), "No".into()], vec![0.5, 0.5], 1000.0);
        market.category = Some("politics".into());
        let signal = Signal::new("m1", market.question.clone(), 0.8, SignalPayload::ActivitySurge { activity_score: 90.0 });
        let embed = formatter.render(&signal, &market, Priority::Low, 50.0, "https://example.com/m1").await;
        let title = embed["title"].as_str().unwrap();
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 2);
    }
}
