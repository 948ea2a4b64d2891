// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Registers descriptions for every metric the resolver emits.
/// Call once at startup, after the exporter is installed.
pub fn describe_metrics() {
    describe_counter!("name_cache_hits_total", "Plant name lookups served from the cache.");
    describe_counter!(
        "name_cache_misses_total",
        "Plant name lookups that found no fresh cache entry."
    );
    describe_gauge!("name_cache_size", "Entries currently held by the plant name cache.");
    describe_counter!(
        "name_cache_swept_total",
        "Expired entries removed by the periodic cache sweep."
    );
    describe_counter!(
        "name_resolution_total",
        "Resolved plant names by outcome (cache_hit, fallback, resolved)."
    );
    describe_counter!("name_rpc_calls_total", "Remote calls issued by the name source.");
    describe_counter!(
        "name_rpc_retries_total",
        "Failed remote attempts that were retried, by kind (getPlantName, aggregate3)."
    );
    describe_histogram!("multicall_batch_size", "Calls per aggregate3 request.");
}

/// Installs the Prometheus exporter on `0.0.0.0:port`.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(port: u16) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install prometheus exporter on {}: {}", addr, e))?;
    Ok(())
}

pub fn increment_cache_hit() {
    counter!("name_cache_hits_total", 1);
}

pub fn increment_cache_miss() {
    counter!("name_cache_misses_total", 1);
}

pub fn set_cache_size(size: f64) {
    gauge!("name_cache_size", size);
}

pub fn record_cache_swept(removed: u64) {
    counter!("name_cache_swept_total", removed);
}

pub fn increment_resolution(outcome: &'static str) {
    counter!("name_resolution_total", 1, "outcome" => outcome);
}

pub fn increment_rpc_call(method: &'static str) {
    counter!("name_rpc_calls_total", 1, "method" => method);
}

/// `kind` label values for `name_rpc_retries_total`.
pub const RETRY_GET_PLANT_NAME: &str = "getPlantName";
pub const RETRY_AGGREGATE3: &str = "aggregate3";

pub fn increment_retry(kind: &'static str) {
    counter!("name_rpc_retries_total", 1, "kind" => kind);
}

pub fn record_multicall_batch_size(size: f64) {
    histogram!("multicall_batch_size", size);
}
