//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submission, confirmation and reverts
//! - Approval submissions versus skipped approvals
//! - Cross-chain transfer phase progress
//!
//! The process is short-lived, so metrics are rendered once to a textfile
//! (node_exporter textfile collector format) instead of being served.

use crate::coordination::TransferPhase;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec,
    TextEncoder,
};
use std::path::Path;
use tracing::info;

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "chainswap_transactions_submitted_total",
        "Total transactions submitted",
        &["chain_id", "action"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "chainswap_transactions_confirmed_total",
        "Total transactions confirmed successfully",
        &["chain_id", "action"]
    ).unwrap();

    pub static ref TX_REVERTED: CounterVec = register_counter_vec!(
        "chainswap_transactions_reverted_total",
        "Total transactions mined with a reverted status",
        &["chain_id", "action"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "chainswap_confirmation_latency_seconds",
        "Time from submission to observed inclusion",
        &["chain_id"],
        vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Approval metrics
    pub static ref APPROVALS: CounterVec = register_counter_vec!(
        "chainswap_approvals_total",
        "Approval step results",
        &["chain_id", "result"]
    ).unwrap();

    // Bridge metrics
    pub static ref BRIDGE_PHASES: CounterVec = register_counter_vec!(
        "chainswap_bridge_phase_reached_total",
        "Cross-chain transfer phases reached",
        &["phase"]
    ).unwrap();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}

/// Write metrics to `path` for a textfile collector
pub fn write_textfile(path: &Path) -> Result<()> {
    let body = render()?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to write metrics to {:?}", path))?;
    info!("Metrics written to {:?}", path);
    Ok(())
}

// Helper functions to record metrics

pub fn record_tx_submitted(chain_id: u64, action: &str) {
    TX_SUBMITTED
        .with_label_values(&[&chain_id.to_string(), action])
        .inc();
}

pub fn record_tx_confirmed(chain_id: u64, action: &str) {
    TX_CONFIRMED
        .with_label_values(&[&chain_id.to_string(), action])
        .inc();
}

pub fn record_tx_reverted(chain_id: u64, action: &str) {
    TX_REVERTED
        .with_label_values(&[&chain_id.to_string(), action])
        .inc();
}

pub fn record_tx_latency(chain_id: u64, latency_secs: f64) {
    TX_LATENCY
        .with_label_values(&[&chain_id.to_string()])
        .observe(latency_secs);
}

pub fn record_approval_submitted(chain_id: u64) {
    APPROVALS
        .with_label_values(&[&chain_id.to_string(), "submitted"])
        .inc();
}

pub fn record_approval_skipped(chain_id: u64) {
    APPROVALS
        .with_label_values(&[&chain_id.to_string(), "skipped"])
        .inc();
}

pub fn record_bridge_phase(phase: &TransferPhase) {
    BRIDGE_PHASES.with_label_values(&[phase.name()]).inc();
}
