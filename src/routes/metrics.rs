use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, TextEncoder};

use crate::error::ApiError;

/// Prometheus text exposition of everything registered in the default registry.
pub async fn metrics_handler() -> Result<Response, ApiError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| anyhow::anyhow!("Metrics encoding failed: {e}"))?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer).into_response())
}
