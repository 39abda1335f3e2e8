// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP surface: the rate-limit middleware and the routes it protects.
//!
//! The REST API (`/api/v1`) and the federation inboxes each sit behind
//! their own [`RateLimitGate`], so exhausting one group never affects the
//! other. Health and metrics endpoints are never limited.

use crate::bypass::{Authenticator, BypassResolver, TokenRegistry};
use crate::config::{Config, IngressConfig, RateLimitConfig};
use crate::error::SetupError;
use crate::gate::{GateDecision, RateLimitGate};
use crate::metrics::Metrics;
use crate::request::AdmissionRequest;
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Shared application state.
pub struct AppState {
    pub api: GuardedGroup,
    pub activity_pub: GuardedGroup,
    pub metrics: Arc<Metrics>,
    pub config: Config,
}

/// A gate plus the ingress settings its middleware needs.
#[derive(Clone)]
pub struct GuardedGroup {
    pub gate: Arc<RateLimitGate>,
    pub ingress: Arc<IngressConfig>,
}

impl AppState {
    /// Build both route-group gates over the given collaborators.
    ///
    /// Refuses configurations the router or the counters cannot honour.
    pub fn new(
        config: Config,
        registry: Arc<dyn TokenRegistry>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let metrics = Arc::new(Metrics::new()?);
        let resolver = Arc::new(BypassResolver::new(registry, authenticator));
        let ingress = Arc::new(config.ingress.clone());

        let group = |name: &str, limits: RateLimitConfig| -> Result<GuardedGroup, SetupError> {
            Ok(GuardedGroup {
                gate: Arc::new(RateLimitGate::new(
                    name,
                    limits,
                    &config.rejection,
                    resolver.clone(),
                    metrics.clone(),
                )?),
                ingress: ingress.clone(),
            })
        };
        let api = group("api", config.api.clone())?;
        let activity_pub = group("activity_pub", config.activity_pub.clone())?;

        Ok(Self {
            api,
            activity_pub,
            metrics,
            config,
        })
    }

    pub fn cleanup(&self) {
        self.api.gate.cleanup();
        self.activity_pub.gate.cleanup();
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Acknowledgement returned by the protected placeholder routes.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub status: &'static str,
}

/// Assemble the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/ping", get(api_ping))
        .route("/runners/jobs/request", post(runner_job_request))
        .route_layer(middleware::from_fn_with_state(
            state.api.clone(),
            enforce_rate_limit,
        ));

    let federation = Router::new()
        .route("/inbox", post(inbox))
        .route("/accounts/:name/inbox", post(account_inbox))
        .route_layer(middleware::from_fn_with_state(
            state.activity_pub.clone(),
            enforce_rate_limit,
        ));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));
    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.nest("/api/v1", api)
        .merge(federation)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Rate-limit middleware for one route group.
///
/// Buffers the body so the automation token can be read, then hands the
/// request downstream unchanged.
pub async fn enforce_rate_limit(
    State(group): State<GuardedGroup>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, group.ingress.body_limit_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "Failed to buffer request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let admission =
        AdmissionRequest::from_http(&parts, &bytes, group.ingress.trust_forwarded_for);
    let request = Request::from_parts(parts, Body::from(bytes));

    match group.gate.evaluate(&admission).await {
        GateDecision::Exempt(rule) => {
            debug!(client = %admission.client_key, %rule, "Forwarding exempt request");
            next.run(request).await
        }
        GateDecision::Admitted {
            ticket,
            remaining,
            reset_in,
        } => {
            let mut response = next.run(request).await;
            group.gate.complete(&ticket, response.status());
            insert_quota_headers(
                response.headers_mut(),
                group.gate.config().max_requests,
                remaining,
                reset_in,
            );
            response
        }
        GateDecision::Rejected { retry_after } => group.gate.responder().respond(retry_after),
    }
}

fn insert_quota_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_in: Duration) {
    let reset_at = chrono::Utc::now().timestamp() + reset_in.as_secs_f64().ceil() as i64;
    for (name, value) in [
        ("x-ratelimit-limit", i64::from(limit)),
        ("x-ratelimit-remaining", i64::from(remaining)),
        ("x-ratelimit-reset", reset_at),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "bastion-rate-limiter",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn api_ping() -> Json<Ack> {
    Json(Ack { status: "ok" })
}

/// Job polling endpoint used by automation clients.
pub async fn runner_job_request(Json(body): Json<Value>) -> Response {
    if body.is_object() {
        Json(Ack { status: "queued" }).into_response()
    } else {
        StatusCode::BAD_REQUEST.into_response()
    }
}

pub async fn inbox() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn account_inbox(Path(name): Path<String>) -> StatusCode {
    debug!(account = %name, "Inbox delivery");
    StatusCode::NO_CONTENT
}
