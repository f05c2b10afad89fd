// Prometheus metrics definitions for the bot.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Chats with an open (unflushed) batch.
    pub static ref OPEN_BATCHES: IntGauge =
        IntGauge::new("tetsuoni_open_batches", "Chats with an open report batch").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Station reports, by outcome (registered, updated, unknown_station, duplicate).
    pub static ref REPORTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tetsuoni_reports_total", "Station reports by outcome"),
        &["outcome"],
    )
    .unwrap();

    /// Batches that reached quorum and were handed to the renderer.
    pub static ref FLUSHES_TOTAL: IntCounter =
        IntCounter::new("tetsuoni_flushes_total", "Batches flushed for rendering").unwrap();

    /// Render failures, by kind (asset_missing, encode, panicked).
    pub static ref RENDER_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tetsuoni_render_failures_total", "Render failures by kind"),
        &["kind"],
    )
    .unwrap();

    /// Delivery failures, by stage (upload, reply).
    pub static ref DELIVERY_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tetsuoni_delivery_failures_total", "Delivery failures by stage"),
        &["stage"],
    )
    .unwrap();

    /// Inbound webhook events, by kind (text, ignored, bad_signature).
    pub static ref WEBHOOK_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tetsuoni_webhook_events_total", "Inbound webhook events"),
        &["kind"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Time to compose and encode one map, in seconds.
    pub static ref RENDER_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("tetsuoni_render_duration_seconds", "Map render time in seconds")
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(OPEN_BATCHES.clone()),
        Box::new(REPORTS_TOTAL.clone()),
        Box::new(FLUSHES_TOTAL.clone()),
        Box::new(RENDER_FAILURES_TOTAL.clone()),
        Box::new(DELIVERY_FAILURES_TOTAL.clone()),
        Box::new(WEBHOOK_EVENTS_TOTAL.clone()),
        Box::new(RENDER_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Failed to register metric: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
