// ============================================================================
// PROMETHEUS METRICS
// ============================================================================
// Request and access-gate counters scraped from BASE_PATH/metrics
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec, IntCounter,
    IntCounterVec,
};

lazy_static! {
    // ========================================================================
    // HTTP REQUEST METRICS
    // ========================================================================

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========================================================================
    // ACCESS GATE METRICS
    // ========================================================================

    /// Requests refused by the gate, by reason (blocked_ip, blocked_geoip, brute_force)
    pub static ref GATE_DENIALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "gate_denials_total",
        "Requests denied by the access gate",
        &["reason"]
    )
    .unwrap();

    /// Transitions of an IP into the locked state
    pub static ref BRUTE_FORCE_LOCKOUTS_TOTAL: IntCounter = register_int_counter!(
        "brute_force_lockouts_total",
        "IP lockouts triggered by repeated failed logins"
    )
    .unwrap();

    /// API key outcomes: success, bad_header, invalid, disabled, error, forbidden
    pub static ref API_KEY_AUTH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "api_key_auth_total",
        "API key authentication and authorization outcomes",
        &["outcome"]
    )
    .unwrap();
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

pub fn record_gate_denial(reason: &str) {
    GATE_DENIALS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_api_key_auth(outcome: &str) {
    API_KEY_AUTH_TOTAL.with_label_values(&[outcome]).inc();
}
