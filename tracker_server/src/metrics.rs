//! Prometheus metrics for tracker observability.

use metrics::{counter, histogram};

use crate::error::Result;
use crate::models::MatchMethod;

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record the outcome of one external call.
pub fn external_call<T>(service: &'static str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) if e.is_rate_limited() => "rate_limited",
        Err(_) => "error",
    };
    counter!("tracker_external_calls_total", "service" => service, "outcome" => outcome)
        .increment(1);
}

/// Record a cache lookup.
pub fn cache_lookup(cache: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("tracker_cache_lookups_total", "cache" => cache, "result" => result).increment(1);
}

/// Record a per-record lookup failure.
pub fn lookup_failed(stage: &str, rate_limited: bool) {
    counter!(
        "tracker_lookup_failures_total",
        "stage" => stage.to_string(),
        "rate_limited" => rate_limited.to_string()
    )
    .increment(1);
}

/// Record which method correlated a deployment.
pub fn correlation(method: MatchMethod) {
    counter!("tracker_correlations_total", "method" => method.as_str()).increment(1);
}

/// Record an evaluated coordination state.
pub fn coordination(environment: &'static str, status: &'static str) {
    counter!("tracker_coordination_total", "environment" => environment, "status" => status)
        .increment(1);
}

/// Record how long a full environment refresh took.
pub fn refresh_duration(environment: &'static str, duration_ms: u64) {
    histogram!("tracker_refresh_duration_ms", "environment" => environment)
        .record(duration_ms as f64);
}
