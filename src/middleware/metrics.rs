//! Prometheus metrics for coursegate.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! Counters live in the global default registry.

use once_cell::sync::Lazy;
use prometheus::{opts, register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

use crate::auth::kind::PrincipalKind;

static GATE_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "coursegate_auth_gate_decisions_total",
            "Auth gate outcomes by principal kind"
        ),
        &["kind", "outcome"]
    )
    .expect("failed to register coursegate_auth_gate_decisions_total")
});

static LOGOUTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("coursegate_logouts_total", "Logout attempts by principal kind"),
        &["kind", "result"]
    )
    .expect("failed to register coursegate_logouts_total")
});

/// Count one gate decision. `outcome` is `admitted` or a rejection reason.
pub fn record_gate_decision(kind: PrincipalKind, outcome: &str) {
    GATE_DECISIONS
        .with_label_values(&[kind.as_str(), outcome])
        .inc();
}

pub fn record_logout(kind: PrincipalKind, recorded: bool) {
    let result = if recorded { "ok" } else { "failed" };
    LOGOUTS.with_label_values(&[kind.as_str(), result]).inc();
}

/// Encode all registered metrics as Prometheus text format.
/// Called by the `/metrics` HTTP handler.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}
