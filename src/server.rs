//! HTTP surface: pod label lookups, span intake and metrics

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::forwarder::Forwarder;
use crate::lookup::LookupService;
use crate::metrics::{Metrics, PrometheusExporter};
use crate::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use podtag_common::JSON_CONTENT_TYPE;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct AppState {
    lookup: Arc<LookupService>,
    forwarder: Arc<dyn Forwarder>,
    metrics: Metrics,
    exporter: Arc<PrometheusExporter>,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(lookup: LookupService, forwarder: Arc<dyn Forwarder>, metrics: Metrics) -> Self {
        Self {
            lookup: Arc::new(lookup),
            forwarder,
            exporter: Arc::new(PrometheusExporter::new(metrics.clone())),
            metrics,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Largest span batch the intake route reads
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    Router::new()
        .route("/pod", get(missing_identity))
        .route("/pod/", get(missing_identity))
        .route("/pod/*identity", get(lookup_pod))
        .route("/api/v2/spans", post(receive_spans).layer(body_limit))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serve until `cancel` fires, then drain in-flight requests.
pub async fn serve(addr: SocketAddr, state: AppState, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

fn malformed_identity(state: &AppState, path: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!(
            "{} not of form /pod/{}",
            path,
            state.lookup.scheme().expected_form()
        ),
    )
        .into_response()
}

async fn missing_identity(State(state): State<AppState>, uri: Uri) -> Response {
    malformed_identity(&state, uri.path())
}

async fn lookup_pod(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let identity = match state.lookup.scheme().parse(&raw) {
        Ok(identity) => identity,
        Err(_) => return malformed_identity(&state, &format!("/pod/{}", raw)),
    };

    debug!(pod = %identity, "Looking up pod");

    let Some(labels) = state.lookup.lookup(&identity) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match serde_json::to_vec(&labels) {
        Ok(body) => ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!(pod = %identity, error = %e, "Could not convert pod labels to JSON");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn receive_spans(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(JSON_CONTENT_TYPE);
    let content_encoding = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());

    let (payload, summary) = state
        .lookup
        .enrich_batch(content_type, content_encoding, body);
    debug!(
        spans = summary.spans,
        enriched = summary.enriched,
        decoded = summary.decoded,
        "Received span batch"
    );

    if let Err(e) = state.forwarder.forward(payload).await {
        error!(error = %e, "Failed to forward span batch");
        state.metrics.record_forward_failure();
    }

    StatusCode::ACCEPTED
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.exporter.render() {
        Ok(text) => ([(CONTENT_TYPE, state.exporter.content_type())], text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}
