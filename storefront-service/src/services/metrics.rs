use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static CHECKOUTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PAYMENT_TRANSITIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static CAPTURED_AMOUNT_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Install the HTTP metrics recorder and register the storefront counters.
/// Call once per process.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics already initialized"))?;

    let registry = Registry::new();

    let checkouts = IntCounterVec::new(
        Opts::new(
            "storefront_checkouts_total",
            "Checkout attempts by outcome",
        ),
        &["outcome"],
    )?;

    let transitions = IntCounterVec::new(
        Opts::new(
            "storefront_payment_transitions_total",
            "Applied order status transitions",
        ),
        &["from", "to"],
    )?;

    // Minor units (paise for INR)
    let captured = IntCounterVec::new(
        Opts::new(
            "storefront_captured_amount_total",
            "Captured payment amounts by currency, in minor units",
        ),
        &["currency"],
    )?;

    registry.register(Box::new(checkouts.clone()))?;
    registry.register(Box::new(transitions.clone()))?;
    registry.register(Box::new(captured.clone()))?;

    let _ = PROMETHEUS_REGISTRY.set(registry);
    let _ = CHECKOUTS_TOTAL.set(checkouts);
    let _ = PAYMENT_TRANSITIONS_TOTAL.set(transitions);
    let _ = CAPTURED_AMOUNT_TOTAL.set(captured);
    Ok(())
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

pub fn record_checkout(outcome: &str) {
    if let Some(counter) = CHECKOUTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_transition(from: &str, to: &str) {
    if let Some(counter) = PAYMENT_TRANSITIONS_TOTAL.get() {
        counter.with_label_values(&[from, to]).inc();
    }
}

pub fn record_captured_amount(currency: &str, amount_minor: u64) {
    if let Some(counter) = CAPTURED_AMOUNT_TOTAL.get() {
        counter.with_label_values(&[currency]).inc_by(amount_minor);
    }
}
