use axum::http::StatusCode;
use prometheus::{Encoder, TextEncoder};

use crate::services::metrics;

/// GET /metrics: Prometheus scrape endpoint for lifecycle and reminder counters.
pub async fn metrics_handler() -> Result<String, StatusCode> {
    metrics::register_all();

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
