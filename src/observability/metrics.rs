//! Metrics collection and exposition.
//!
//! # Metrics
//! - `anchor_dispatch_total` (counter): back-end calls by backend, outcome
//! - `anchor_dispatch_duration_seconds` (histogram): per-backend latency
//! - `anchor_batches_total` (counter): dispatched batches by status
//! - `anchor_key_derivations_total` (counter): by variant, cache hit/miss
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one back-end call. `outcome` is `success` or an error kind.
pub fn record_dispatch(backend: &str, outcome: &str, elapsed: Duration) {
    metrics::counter!(
        "anchor_dispatch_total",
        "backend" => backend.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "anchor_dispatch_duration_seconds",
        "backend" => backend.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_batch(status: &'static str) {
    metrics::counter!("anchor_batches_total", "status" => status).increment(1);
}

pub fn record_key_derivation(variant: &'static str, cache_hit: bool) {
    let cache = if cache_hit { "hit" } else { "miss" };
    metrics::counter!(
        "anchor_key_derivations_total",
        "variant" => variant,
        "cache" => cache
    )
    .increment(1);
}
