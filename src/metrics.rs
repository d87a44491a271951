//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default port 9090).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `book_search_upstream_requests_total` - Catalog calls (label: outcome)
//! - `book_search_rate_limited_total` - Requests rejected by the rate limiter
//! - `book_search_auth_failures_total` - Rejected bearer tokens (label: reason)
//! - `book_search_tokens_issued_total` - Tokens issued by `/login`
//!
//! ## Histograms
//! - `book_search_upstream_duration_seconds` - Catalog call duration (label: outcome)
//!
//! ## Gauges
//! - `book_search_rate_limit_tracked_clients` - Entries in the rate limit table
//! - `book_search_auth_failure_tracked_clients` - Clients with recent bad tokens

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const UPSTREAM_REQUESTS_TOTAL: &str = "book_search_upstream_requests_total";
    pub const UPSTREAM_DURATION_SECONDS: &str = "book_search_upstream_duration_seconds";
    pub const RATE_LIMITED_TOTAL: &str = "book_search_rate_limited_total";
    pub const AUTH_FAILURES_TOTAL: &str = "book_search_auth_failures_total";
    pub const TOKENS_ISSUED_TOTAL: &str = "book_search_tokens_issued_total";
    pub const RATE_LIMIT_TRACKED_CLIENTS: &str = "book_search_rate_limit_tracked_clients";
    pub const AUTH_FAILURE_TRACKED_CLIENTS: &str = "book_search_auth_failure_tracked_clients";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::UPSTREAM_REQUESTS_TOTAL,
        "Total number of catalog search calls"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Catalog search call duration in seconds"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Total number of rejected bearer tokens"
    );
    describe_counter!(names::TOKENS_ISSUED_TOTAL, "Total number of tokens issued");
    describe_gauge!(
        names::RATE_LIMIT_TRACKED_CLIENTS,
        "Number of client keys held by the rate limiter"
    );
    describe_gauge!(
        names::AUTH_FAILURE_TRACKED_CLIENTS,
        "Number of client keys held by the auth failure limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one catalog call.
pub fn record_upstream_request(outcome: &'static str, duration_secs: f64) {
    counter!(names::UPSTREAM_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::UPSTREAM_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

/// Record a request rejected by the rate limiter.
pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

/// Record a rejected bearer token.
pub fn record_auth_failure(reason: &'static str) {
    counter!(names::AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

/// Record an issued token.
pub fn record_token_issued() {
    counter!(names::TOKENS_ISSUED_TOTAL).increment(1);
}

/// Update the rate limit table size gauge.
pub fn set_rate_limit_tracked_clients(count: usize) {
    gauge!(names::RATE_LIMIT_TRACKED_CLIENTS).set(count as f64);
}

/// Update the auth failure table size gauge.
pub fn set_auth_failure_tracked_clients(count: usize) {
    gauge!(names::AUTH_FAILURE_TRACKED_CLIENTS).set(count as f64);
}
