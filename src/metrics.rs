//! Prometheus metrics for the animator
//!
//! Each [`Animator`](crate::runtime::Animator) owns its own registry, so
//! several animators in one process never collide on metric names.

use crate::error::{AnimatorError, Result};
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry,
};

/// Core metrics of the toggle pipeline and the block movers
pub struct AnimatorMetrics {
    registry: Registry,

    // Pipeline metrics
    pub requests_total: CounterVec,
    pub rejections_total: CounterVec,
    pub protection_check_seconds: Histogram,

    // Mover metrics
    pub animations_total: CounterVec,
    pub active_animations: Gauge,
    pub animation_ticks: Histogram,
    pub restore_retries_total: Counter,

    // Scheduler metrics
    pub auto_toggles_total: CounterVec,
}

impl AnimatorMetrics {
    /// Create a new metrics instance
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("animator_toggle_requests_total", "Toggle requests submitted"),
            &["cause"],
        )?;
        let rejections_total = CounterVec::new(
            Opts::new("animator_toggle_rejections_total", "Toggle requests rejected"),
            &["reason"],
        )?;
        let protection_check_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "animator_protection_check_seconds",
                "Time spent waiting on protection hooks",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;

        let animations_total = CounterVec::new(
            Opts::new("animator_animations_total", "Animations by terminal state"),
            &["outcome"],
        )?;
        let active_animations =
            Gauge::new("animator_active_animations", "Animations currently in flight")?;
        let animation_ticks = Histogram::with_opts(
            HistogramOpts::new("animator_animation_ticks", "Ticks per finished animation")
                .buckets(vec![1.0, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0, 320.0, 600.0]),
        )?;
        let restore_retries_total = Counter::new(
            "animator_restore_retries_total",
            "Rollbacks that needed a retry to restore blocks",
        )?;

        let auto_toggles_total = CounterVec::new(
            Opts::new("animator_auto_toggles_total", "Deferred toggles by result"),
            &["result"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(protection_check_seconds.clone()))?;
        registry.register(Box::new(animations_total.clone()))?;
        registry.register(Box::new(active_animations.clone()))?;
        registry.register(Box::new(animation_ticks.clone()))?;
        registry.register(Box::new(restore_retries_total.clone()))?;
        registry.register(Box::new(auto_toggles_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            rejections_total,
            protection_check_seconds,
            animations_total,
            active_animations,
            animation_ticks,
            restore_retries_total,
            auto_toggles_total,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a submitted request
    pub fn record_request(&self, cause: &str) {
        self.requests_total.with_label_values(&[cause]).inc();
    }

    /// Record a pipeline rejection
    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    /// Record how long the protection hooks took
    pub fn record_protection_check(&self, secs: f64) {
        self.protection_check_seconds.observe(secs);
    }

    /// Record a block mover starting
    pub fn record_animation_started(&self) {
        self.active_animations.inc();
    }

    /// Record a block mover reaching a terminal state
    pub fn record_animation_finished(&self, outcome: &str, ticks: u64) {
        self.active_animations.dec();
        self.animations_total.with_label_values(&[outcome]).inc();
        self.animation_ticks.observe(ticks as f64);
    }

    /// Record a restore that had to be retried
    pub fn record_restore_retry(&self) {
        self.restore_retries_total.inc();
    }

    /// Record a fired auto-toggle
    pub fn record_auto_toggle(&self, admitted: bool) {
        let result = if admitted { "admitted" } else { "rejected" };
        self.auto_toggles_total.with_label_values(&[result]).inc();
    }

    /// Gather all metrics as text
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AnimatorError::Metrics(format!("encode error: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| AnimatorError::Metrics(format!("utf8 error: {}", e)))
    }
}

impl std::fmt::Debug for AnimatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatorMetrics")
            .field("active_animations", &self.active_animations.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = AnimatorMetrics::new().unwrap();
        assert!(metrics.gather_text().is_ok());
    }

    #[test]
    fn test_animation_metrics() {
        let metrics = AnimatorMetrics::new().unwrap();

        metrics.record_animation_started();
        metrics.record_animation_started();
        metrics.record_animation_finished("completed", 40);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("animator_active_animations 1"));
        assert!(text.contains("animator_animations_total{outcome=\"completed\"} 1"));
    }

    #[test]
    fn test_rejection_metrics() {
        let metrics = AnimatorMetrics::new().unwrap();

        metrics.record_request("player");
        metrics.record_rejection("locked");
        metrics.record_rejection("locked");

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("animator_toggle_requests_total{cause=\"player\"} 1"));
        assert!(text.contains("animator_toggle_rejections_total{reason=\"locked\"} 2"));
    }
}
