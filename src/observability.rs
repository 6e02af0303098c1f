//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Metrics collection and Prometheus export
//! - Span helpers for pipeline, OCR, database and model operations
//! - Database readiness check

use std::time::Duration;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::PgPool;
use tracing_subscriber::prelude::*;
use uuid::Uuid;

use crate::observability_config::ObservabilityConfig;

/// Initialize logging and, when enabled, the Prometheus recorder.
///
/// Returns the handle used to render `/metrics`, or `None` when metrics export
/// is disabled.
pub fn init_observability_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<PrometheusHandle>> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing_with_config(config)?;

    let metrics_handle = if config.enable_metrics_export {
        Some(init_metrics_with_config(config)?)
    } else {
        None
    };

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = config.enable_metrics_export,
        "Observability stack initialized successfully"
    );
    Ok(metrics_handle)
}

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("receipt_ledger={}", config.log_level).parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    // Pretty for development, JSON for everything else
    if config.use_pretty_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Initialize metrics collection with Prometheus exporter and configuration
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        "Metrics collection initialized"
    );
    Ok(handle)
}

/// Create a span for a pipeline run
pub fn pipeline_span(operation: &str, owner_id: Uuid) -> tracing::Span {
    tracing::info_span!(
        "pipeline_operation",
        operation = operation,
        owner_id = %owner_id,
        component = "pipeline"
    )
}

/// Create a span for OCR operations
pub fn ocr_span(operation: &str) -> tracing::Span {
    tracing::info_span!("ocr_operation", operation = operation, component = "ocr")
}

/// Create a span for database operations
pub fn db_span(operation: &str, table: &str) -> tracing::Span {
    tracing::info_span!(
        "db_operation",
        operation = operation,
        table = table,
        component = "database"
    )
}

/// Create a span for language model calls
pub fn model_span(operation: &str, model: &str) -> tracing::Span {
    tracing::info_span!(
        "model_operation",
        operation = operation,
        model = model,
        component = "language_model"
    )
}

/// Record the duration and outcome of a pipeline stage
pub fn record_stage_metrics(stage: &'static str, outcome: &'static str, duration: Duration) {
    metrics::counter!("pipeline_stage_total", "stage" => stage, "outcome" => outcome).increment(1);
    metrics::histogram!("pipeline_stage_duration_seconds", "stage" => stage)
        .record(duration.as_secs_f64());
}

/// Record a switch to the fallback OCR languages
pub fn record_ocr_fallback(primary: &str, fallback: &str) {
    let primary = primary.to_string();
    let fallback = fallback.to_string();
    metrics::counter!("ocr_language_fallback_total", "primary" => primary, "fallback" => fallback)
        .increment(1);
}

/// Record a language model request
pub fn record_model_request(result: &'static str, duration: Duration) {
    metrics::counter!("model_requests_total", "result" => result).increment(1);
    metrics::histogram!("model_request_duration_seconds").record(duration.as_secs_f64());
}

/// Update circuit breaker state metric
pub fn update_circuit_breaker_state(component: &'static str, is_open: bool) {
    metrics::gauge!("circuit_breaker_state", "component" => component)
        .set(if is_open { 1.0 } else { 0.0 });
}

/// Record one expense commit attempt
pub fn record_commit_attempt(result: &'static str) {
    metrics::counter!("expense_commit_attempts_total", "result" => result).increment(1);
}

/// Record request metrics
pub fn record_request_metrics(method: &str, route: &'static str, status: u16, duration: Duration) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "method" => method, "route" => route, "status" => status)
        .increment(1);
    metrics::histogram!("request_duration_seconds", "route" => route)
        .record(duration.as_secs_f64());
}

/// Check database connectivity and basic query capability
pub async fn check_database_health(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;

    tracing::debug!("Database health check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_helpers_without_recorder() {
        // No recorder installed: every helper is a no-op
        record_stage_metrics("uploaded", "success", Duration::from_millis(3));
        record_ocr_fallback("spa+eng", "eng");
        record_model_request("success", Duration::from_millis(10));
        update_circuit_breaker_state("model", false);
        record_commit_attempt("busy");
        record_request_metrics("POST", "/receipts/process", 201, Duration::from_millis(5));
    }

    #[test]
    fn test_span_helpers_without_subscriber() {
        let _ = pipeline_span("process", Uuid::new_v4());
        let _ = ocr_span("recognize");
        let _ = db_span("insert_batch", "expenses");
        let _ = model_span("complete", "gpt-4o-mini");
    }
}
