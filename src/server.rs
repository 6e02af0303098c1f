//! HTTP surface for the receipt pipeline.
//!
//! Routes:
//! - `POST /receipts/process`: raw image body, `Content-Type` selects the media type
//! - `POST /receipts/confirm`: JSON `{receipt_path, expenses}`
//! - `GET /health/live`, `GET /health/ready`, `GET /metrics`
//!
//! The caller's identity arrives in the `X-User-Id` header, set by the
//! authenticating proxy in front of this service.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::errors::{InputViolation, ReceiptError};
use crate::observability;
use crate::pipeline::{ConfirmRequest, ReceiptPipeline};

/// Header carrying the authenticated owner id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Upper bound for confirm request bodies
const MAX_CONFIRM_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for every connection
pub struct AppState {
    pub pipeline: ReceiptPipeline,
    pub metrics: Option<PrometheusHandle>,
    pub pool: Option<PgPool>,
}

/// Accept connections forever, serving each on its own task
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = hyper::service::service_fn(move |req| {
                        route(req, Arc::clone(&state))
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::error!("Error serving connection: {:?}", err);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Error accepting connection: {}", e);
            }
        }
    }
}

/// Dispatch one request
pub async fn route<B>(req: Request<B>, state: Arc<AppState>) -> Result<Response<String>, Infallible>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let (label, response) = match (&method, path.as_str()) {
        (&Method::POST, "/receipts/process") => {
            ("/receipts/process", handle_process(req, &state).await)
        }
        (&Method::POST, "/receipts/confirm") => {
            ("/receipts/confirm", handle_confirm(req, &state).await)
        }
        (&Method::GET, "/health/live") => ("/health/live", text_response(StatusCode::OK, "OK")),
        (&Method::GET, "/health/ready") => ("/health/ready", readiness(&state).await),
        (&Method::GET, "/metrics") => ("/metrics", render_metrics(&state)),
        _ => (
            "unmatched",
            json_response(StatusCode::NOT_FOUND, &json!({"detail": "Not Found"})),
        ),
    };

    observability::record_request_metrics(
        method.as_str(),
        label,
        response.status().as_u16(),
        start_time.elapsed(),
    );
    Ok(response)
}

async fn handle_process<B>(req: Request<B>, state: &AppState) -> Response<String>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let owner_id = match owner_from_headers(&req) {
        Ok(owner_id) => owner_id,
        Err(response) => return response,
    };
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let limit = state.pipeline.storage().max_upload_bytes();
    let declared_length = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if declared_length.is_some_and(|length| length > limit) {
        return error_response(&InputViolation::PayloadTooLarge { limit }.into());
    }

    let bytes = match read_body(req.into_body(), limit as usize).await {
        Ok(bytes) => bytes,
        Err(BodyError::TooLarge) => {
            return error_response(&InputViolation::PayloadTooLarge { limit }.into())
        }
        Err(BodyError::Read(msg)) => {
            return error_response(&InputViolation::MalformedRequest(msg).into())
        }
    };

    match state.pipeline.process(owner_id, &content_type, &bytes).await {
        Ok(outcome) => json_response(StatusCode::CREATED, &outcome),
        Err(err) => error_response(&err),
    }
}

async fn handle_confirm<B>(req: Request<B>, state: &AppState) -> Response<String>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let owner_id = match owner_from_headers(&req) {
        Ok(owner_id) => owner_id,
        Err(response) => return response,
    };

    let bytes = match read_body(req.into_body(), MAX_CONFIRM_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(BodyError::TooLarge) => {
            return error_response(
                &InputViolation::PayloadTooLarge {
                    limit: MAX_CONFIRM_BODY_BYTES as u64,
                }
                .into(),
            )
        }
        Err(BodyError::Read(msg)) => {
            return error_response(&InputViolation::MalformedRequest(msg).into())
        }
    };

    let request: ConfirmRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(e) => {
            return error_response(&InputViolation::MalformedRequest(e.to_string()).into())
        }
    };

    match state
        .pipeline
        .confirm(owner_id, &request.receipt_path, request.expenses)
        .await
    {
        Ok(outcome) => json_response(StatusCode::CREATED, &outcome),
        Err(err) => error_response(&err),
    }
}

async fn readiness(state: &AppState) -> Response<String> {
    let Some(pool) = &state.pool else {
        return text_response(StatusCode::OK, "OK");
    };
    match observability::check_database_health(pool).await {
        Ok(()) => text_response(StatusCode::OK, "OK"),
        Err(e) => text_response(StatusCode::SERVICE_UNAVAILABLE, &format!("NOT READY: {}", e)),
    }
}

fn render_metrics(state: &AppState) -> Response<String> {
    match &state.metrics {
        Some(handle) => {
            let mut response = Response::new(handle.render());
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            response
        }
        None => json_response(
            StatusCode::NOT_FOUND,
            &json!({"detail": "Metrics export is disabled"}),
        ),
    }
}

fn owner_from_headers<B>(req: &Request<B>) -> Result<Uuid, Response<String>> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| {
            json_response(
                StatusCode::UNAUTHORIZED,
                &json!({"detail": "Missing or invalid user identity"}),
            )
        })
}

enum BodyError {
    TooLarge,
    Read(String),
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, BodyError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(format!("failed to read request body: {}", e))),
    }
}

/// JSON `{"detail": ...}` response with the status of the error kind
pub fn error_response(err: &ReceiptError) -> Response<String> {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &json!({"detail": err.to_string()}))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<String> {
    let (status, body) = match serde_json::to_string(body) {
        Ok(body) => (status, body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"detail":"Internal error"}"#.to_string(),
            )
        }
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text_response(status: StatusCode, body: &str) -> Response<String> {
    let mut response = Response::new(body.to_string());
    *response.status_mut() = status;
    response
}
