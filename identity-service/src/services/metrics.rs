//! Prometheus metrics for identity-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

/// HTTP request counter by method, matched route and status.
pub static HTTP_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"] // path is the matched route, not the raw URI
    )
    .expect("Failed to register http_requests_total")
});

/// HTTP request duration histogram by method and matched route.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "identity_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register http_request_duration")
});

/// Auth operation counter by operation and outcome.
pub static AUTH_OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_auth_operations_total",
        "Total number of auth operations",
        &["operation", "status"] // success, failure
    )
    .expect("Failed to register auth_operations_total")
});

/// Upstream provider call counter.
pub static PROVIDER_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_provider_requests_total",
        "Total number of upstream identity provider calls",
        &["provider", "operation", "outcome"]
    )
    .expect("Failed to register provider_requests_total")
});

/// Fallback attempts against the non-resolved provider.
pub static PROVIDER_FALLBACKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_provider_fallbacks_total",
        "Total number of fallback attempts against the other provider",
        &["flow"] // password, token, refresh
    )
    .expect("Failed to register provider_fallbacks_total")
});

/// Users whose provider attribution changed on login.
pub static PROVIDER_MIGRATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_provider_migrations_total",
        "Total number of users migrated between providers on login",
        &["from_provider", "to_provider"]
    )
    .expect("Failed to register provider_migrations_total")
});

/// Users provisioned on first login.
pub static JIT_PROVISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "identity_jit_provisions_total",
        "Total number of users provisioned just in time",
        &["role"]
    )
    .expect("Failed to register jit_provisions_total")
});

/// Lost just-in-time provisioning races resolved as updates.
pub static RECONCILIATION_CONFLICTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "identity_reconciliation_conflicts_total",
        "Total number of provisioning races converted into updates"
    )
    .expect("Failed to register reconciliation_conflicts_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "identity_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&HTTP_REQUESTS_TOTAL);
    Lazy::force(&HTTP_REQUEST_DURATION);
    Lazy::force(&AUTH_OPERATIONS_TOTAL);
    Lazy::force(&PROVIDER_REQUESTS_TOTAL);
    Lazy::force(&PROVIDER_FALLBACKS_TOTAL);
    Lazy::force(&PROVIDER_MIGRATIONS_TOTAL);
    Lazy::force(&JIT_PROVISIONS_TOTAL);
    Lazy::force(&RECONCILIATION_CONFLICTS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
