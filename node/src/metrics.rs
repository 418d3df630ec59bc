//! Prometheus metrics for the item node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; [`NodeMetrics::encode`]
//! renders it in the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub resyncs_started: IntCounter,
    /// Resyncs that committed a decision.
    pub resyncs_done: IntCounter,
    pub resyncs_failed: IntCounter,
    pub resyncs_timed_out: IntCounter,
    pub notifications_received: IntCounter,
    /// Item and parcel notifications dropped while sanitating.
    pub notifications_gated: IntCounter,
    pub notifications_skipped: IntCounter,
    pub packets_rejected: IntCounter,
    /// Sub-item resyncs that ended without committing.
    pub subtree_resyncs_failed: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub active_resyncs: IntGauge,
    pub sanitating_items: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub resync_duration_ms: Histogram,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
        };
        let resyncs_started = counter("itemnet_resyncs_started_total", "Resyncs started")?;
        let resyncs_done = counter("itemnet_resyncs_done_total", "Resyncs that committed a decision")?;
        let resyncs_failed = counter("itemnet_resyncs_failed_total", "Resyncs whose commit failed")?;
        let resyncs_timed_out =
            counter("itemnet_resyncs_timed_out_total", "Resyncs that hit their deadline")?;
        let notifications_received =
            counter("itemnet_notifications_received_total", "Notifications received")?;
        let notifications_gated = counter(
            "itemnet_notifications_gated_total",
            "Item notifications dropped while sanitating",
        )?;
        let notifications_skipped = counter(
            "itemnet_notifications_skipped_total",
            "Notifications skipped because they could not be decoded",
        )?;
        let packets_rejected =
            counter("itemnet_packets_rejected_total", "Packets rejected as a whole")?;
        let subtree_resyncs_failed = counter(
            "itemnet_subtree_resyncs_failed_total",
            "Sub-item resyncs that ended without committing",
        )?;

        let active_resyncs = register_int_gauge_with_registry!(
            Opts::new("itemnet_active_resyncs", "Resync processors currently registered"),
            registry
        )?;
        let sanitating_items = register_int_gauge_with_registry!(
            Opts::new("itemnet_sanitating_items", "Unfinished items still being sanitized"),
            registry
        )?;

        // 10 ms to ~5.5 min
        let resync_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new("itemnet_resync_duration_ms", "Resync duration in milliseconds")
                .buckets(prometheus::exponential_buckets(10.0, 2.0, 16)?),
            registry
        )?;

        Ok(Self {
            registry,
            resyncs_started,
            resyncs_done,
            resyncs_failed,
            resyncs_timed_out,
            notifications_received,
            notifications_gated,
            notifications_skipped,
            packets_rejected,
            subtree_resyncs_failed,
            active_resyncs,
            sanitating_items,
            resync_duration_ms,
        })
    }

    /// Render every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
