/// Metrics and telemetry for the Inkstream backend
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Account lifecycle operations and their outcomes
/// - Login lockouts
/// - Notification delivery
/// - Delayed background actions

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Lifecycle operations by name and outcome
    pub static ref LIFECYCLE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "account_lifecycle_operations_total",
        "Total number of account lifecycle operations",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Accounts blocked after too many failed logins
    pub static ref LOGIN_LOCKOUTS_TOTAL: IntCounter = register_int_counter!(
        "account_login_lockouts_total",
        "Total number of login lockouts applied"
    )
    .unwrap();

    /// Notifications handed to the notifier, by kind
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "account_notifications_total",
        "Total number of notifications emitted",
        &["kind", "outcome"]
    )
    .unwrap();

    /// Delayed actions dispatched by the background scheduler
    pub static ref DELAYED_ACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "account_delayed_actions_total",
        "Total number of delayed actions dispatched",
        &["action", "outcome"]
    )
    .unwrap();
}

/// Record a lifecycle operation outcome
pub fn track_operation(operation: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "rejected" };
    LIFECYCLE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Render all metrics in the Prometheus text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
