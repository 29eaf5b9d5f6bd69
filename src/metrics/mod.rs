//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Broadcast attempts
//! - Retries and replacements by error kind
//! - Send outcomes
//! - Messages in flight

use crate::error::{TransactorError, TransactorResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_int_gauge, Counter,
    CounterVec, Encoder, Histogram, IntGauge, TextEncoder,
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

lazy_static! {
    pub static ref TX_ATTEMPTS: Counter = register_counter!(
        "transactor_send_attempts_total",
        "Total transaction broadcast attempts"
    ).unwrap();

    pub static ref TX_RETRIES: CounterVec = register_counter_vec!(
        "transactor_retries_total",
        "Total retries by the error that caused them",
        &["reason"]
    ).unwrap();

    pub static ref TX_REPLACED: CounterVec = register_counter_vec!(
        "transactor_replacements_total",
        "Total replacement transactions signed",
        &["reason"]
    ).unwrap();

    pub static ref TX_SENT: Counter = register_counter!(
        "transactor_transactions_sent_total",
        "Total sends accepted by the chain"
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "transactor_transactions_failed_total",
        "Total sends that ended with an error",
        &["reason"]
    ).unwrap();

    pub static ref MESSAGES_IN_FLIGHT: IntGauge = register_int_gauge!(
        "transactor_messages_in_flight",
        "Message ids carried by sends in progress"
    ).unwrap();

    pub static ref TX_BACKOFF: Histogram = register_histogram!(
        "transactor_backoff_seconds",
        "Backoff observed before a retry",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> TransactorResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransactorError::Internal(format!("bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| TransactorError::Internal(e.to_string()))
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

pub fn record_send_attempt() {
    TX_ATTEMPTS.inc();
}

pub fn record_retry(reason: &str, backoff: Duration) {
    TX_RETRIES.with_label_values(&[reason]).inc();
    TX_BACKOFF.observe(backoff.as_secs_f64());
}

pub fn record_replacement(reason: &str) {
    TX_REPLACED.with_label_values(&[reason]).inc();
}

pub fn record_tx_sent() {
    TX_SENT.inc();
}

pub fn record_tx_failed(reason: &str) {
    TX_FAILED.with_label_values(&[reason]).inc();
}

pub fn set_messages_in_flight(count: usize) {
    MESSAGES_IN_FLIGHT.set(count as i64);
}
