//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transfer outcomes (sent, failed, skipped by reason)
//! - Submission retries by cause
//! - Confirmation latency

use crate::error::{DisburseError, DisburseResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref TRANSFERS_SENT: CounterVec = register_counter_vec!(
        "disburse_transfers_sent_total",
        "Total confirmed transfers",
        &[]
    ).expect("metric registration");

    pub static ref TRANSFERS_FAILED: CounterVec = register_counter_vec!(
        "disburse_transfers_failed_total",
        "Total transfers that ended in a failure",
        &[]
    ).expect("metric registration");

    pub static ref TRANSFERS_SKIPPED: CounterVec = register_counter_vec!(
        "disburse_transfers_skipped_total",
        "Total destinations skipped before broadcast",
        &["reason"]
    ).expect("metric registration");

    pub static ref SUBMISSION_RETRIES: CounterVec = register_counter_vec!(
        "disburse_submission_retries_total",
        "Total broadcast retries by cause",
        &["cause"]
    ).expect("metric registration");

    pub static ref CONFIRMATION_LATENCY: HistogramVec = register_histogram_vec!(
        "disburse_confirmation_latency_seconds",
        "Time from broadcast to receipt",
        &[],
        vec![1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
    ).expect("metric registration");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> DisburseResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| DisburseError::Internal(format!("Metrics bind failed: {}", e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| DisburseError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_transfer_sent() {
    TRANSFERS_SENT.with_label_values(&[]).inc();
}

pub fn record_transfer_failed() {
    TRANSFERS_FAILED.with_label_values(&[]).inc();
}

pub fn record_transfer_skipped(reason: &str) {
    TRANSFERS_SKIPPED.with_label_values(&[reason]).inc();
}

pub fn record_submission_retry(cause: &str) {
    SUBMISSION_RETRIES.with_label_values(&[cause]).inc();
}

pub fn record_confirmation_latency(latency_secs: f64) {
    CONFIRMATION_LATENCY
        .with_label_values(&[])
        .observe(latency_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_exposes_recorded_metrics() {
        record_transfer_skipped("invalid_address");
        record_submission_retry("underpriced");

        let body = metrics_handler().await.unwrap();
        assert!(body.contains("disburse_transfers_skipped_total"));
        assert!(body.contains("reason=\"invalid_address\""));
        assert!(body.contains("disburse_submission_retries_total"));
    }
}
