//! Prometheus metrics for the pricing service
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Refresh metrics
    pub static ref REFRESHES: CounterVec = register_counter_vec!(
        "pricing_refresh_total",
        "Total number of price refreshes",
        &["status"]
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_REFRESH: Gauge = register_gauge!(
        "pricing_last_successful_refresh_timestamp",
        "Unix timestamp of last refresh that resolved every asset"
    ).unwrap();

    // Source metrics
    pub static ref SOURCE_FAILURES: CounterVec = register_counter_vec!(
        "pricing_source_failures_total",
        "Total number of failed price source calls",
        &["source"]
    ).unwrap();

    // Cache metrics
    pub static ref USD_PRICE: GaugeVec = register_gauge_vec!(
        "pricing_usd_price",
        "Latest USD price per native asset",
        &["chain", "asset"]
    ).unwrap();

    pub static ref STALE_ASSETS: Gauge = register_gauge!(
        "pricing_stale_assets",
        "Native assets served from cache or static defaults after the last refresh"
    ).unwrap();

    pub static ref UNRESOLVED_ASSETS: Gauge = register_gauge!(
        "pricing_unresolved_assets",
        "Assets with no usable price, cache entry or default after the last refresh"
    ).unwrap();
}

/// Record the outcome of a refresh
pub fn record_refresh(success: bool) {
    let status = if success { "success" } else { "failure" };
    REFRESHES.with_label_values(&[status]).inc();
    if success {
        LAST_SUCCESSFUL_REFRESH.set(chrono::Utc::now().timestamp() as f64);
    }
}

/// Record a failed source call
pub fn record_source_failure(source: &str) {
    SOURCE_FAILURES.with_label_values(&[source]).inc();
}

/// Update the price gauge of a native asset
pub fn set_usd_price(chain: &str, asset: &str, price: f64) {
    USD_PRICE.with_label_values(&[chain, asset]).set(price);
}

/// Update stale/unresolved counts after a refresh
pub fn set_asset_health(stale: usize, unresolved: usize) {
    STALE_ASSETS.set(stale as f64);
    UNRESOLVED_ASSETS.set(unresolved as f64);
}
