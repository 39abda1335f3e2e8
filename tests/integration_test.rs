// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Integration tests for the rate-limited router.

mod harness;

use axum::{body::to_bytes, http::StatusCode, Router};
use bastion_rate_limiter::{error::SetupError, handlers::AppState};
use harness::collaborators::{self, ADMIN_BEARER, MODERATOR_BEARER, RUNNER_TOKEN, USER_BEARER};
use harness::generators::RequestSpec;
use serde_json::json;
use std::net::IpAddr;
use std::sync::Arc;
use tower::ServiceExt;

fn peer() -> IpAddr {
    "192.168.1.100".parse().unwrap()
}

async fn status(app: &Router, spec: RequestSpec) -> StatusCode {
    app.clone().oneshot(spec.build()).await.unwrap().status()
}

#[tokio::test]
async fn test_third_request_rejected_with_configured_status() {
    let (app, _) = collaborators::seeded(collaborators::config(2, 10)).await;

    assert_eq!(status(&app, RequestSpec::get("/api/v1/ping", peer())).await, StatusCode::OK);
    assert_eq!(status(&app, RequestSpec::get("/api/v1/ping", peer())).await, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(RequestSpec::get("/api/v1/ping", peer()).build())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "60");
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"Too many requests, please try again later.");
}

#[tokio::test]
async fn test_custom_rejection_response() {
    let mut config = collaborators::config(1, 10);
    config.rejection.status_code = 503;
    config.rejection.message = "busy".to_string();
    let (app, _) = collaborators::seeded(config).await;

    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;
    let response = app
        .clone()
        .oneshot(RequestSpec::get("/api/v1/ping", peer()).build())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"busy");
}

#[tokio::test]
async fn test_registered_runner_token_bypasses_and_does_not_count() {
    let (app, state) = collaborators::seeded(collaborators::config(2, 10)).await;

    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;
    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;

    let runner = RequestSpec::post("/api/v1/runners/jobs/request", peer())
        .json(json!({ "runnerToken": RUNNER_TOKEN }));
    assert_eq!(status(&app, runner).await, StatusCode::OK);

    let form = RequestSpec::post("/api/v1/runners/jobs/request", peer())
        .form(&format!("runnerToken={RUNNER_TOKEN}"));
    // Form body is exempt at the gate; the JSON-only handler then refuses it.
    assert_eq!(status(&app, form).await, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert_eq!(
        state.api.gate.counter().current_count(&peer().into()),
        2
    );
}

#[tokio::test]
async fn test_unregistered_runner_token_is_limited() {
    let (app, _) = collaborators::seeded(collaborators::config(1, 10)).await;

    let spec = || {
        RequestSpec::post("/api/v1/runners/jobs/request", peer())
            .json(json!({ "runnerToken": "revoked" }))
    };
    assert_eq!(status(&app, spec()).await, StatusCode::OK);
    assert_eq!(status(&app, spec()).await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_malformed_runner_token_at_limit_is_rejected() {
    let (app, _) = collaborators::seeded(collaborators::config(2, 10)).await;

    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;
    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;

    let malformed = RequestSpec::post("/api/v1/runners/jobs/request", peer())
        .json(json!({ "runnerToken": { "token": RUNNER_TOKEN } }));
    assert_eq!(status(&app, malformed).await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_privileged_roles_bypass_limit() {
    let (app, state) = collaborators::seeded(collaborators::config(1, 10)).await;

    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;

    for bearer in [ADMIN_BEARER, MODERATOR_BEARER] {
        for _ in 0..3 {
            let spec = RequestSpec::get("/api/v1/ping", peer()).bearer(bearer);
            assert_eq!(status(&app, spec).await, StatusCode::OK);
        }
    }
    assert_eq!(state.api.gate.counter().current_count(&peer().into()), 1);
}

#[tokio::test]
async fn test_unprivileged_and_unknown_bearers_are_limited() {
    let (app, _) = collaborators::seeded(collaborators::config(1, 10)).await;

    let user = || RequestSpec::get("/api/v1/ping", peer()).bearer(USER_BEARER);
    assert_eq!(status(&app, user()).await, StatusCode::OK);
    assert_eq!(status(&app, user()).await, StatusCode::TOO_MANY_REQUESTS);

    let unknown = RequestSpec::get("/api/v1/ping", peer()).bearer("forged");
    assert_eq!(status(&app, unknown).await, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_route_groups_have_independent_quotas() {
    let (app, _) = collaborators::seeded(collaborators::config(1, 2)).await;

    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;
    assert_eq!(
        status(&app, RequestSpec::get("/api/v1/ping", peer())).await,
        StatusCode::TOO_MANY_REQUESTS
    );

    assert_eq!(
        status(&app, RequestSpec::post("/inbox", peer())).await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        status(&app, RequestSpec::post("/accounts/alice/inbox", peer())).await,
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        status(&app, RequestSpec::post("/inbox", peer())).await,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_health_is_never_limited() {
    let (app, _) = collaborators::seeded(collaborators::config(1, 1)).await;

    for _ in 0..5 {
        assert_eq!(status(&app, RequestSpec::get("/health", peer())).await, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_quota_headers_on_admitted_response() {
    let (app, _) = collaborators::seeded(collaborators::config(5, 10)).await;

    let response = app
        .clone()
        .oneshot(RequestSpec::get("/api/v1/ping", peer()).build())
        .await
        .unwrap();
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "4");
    assert!(response.headers().contains_key("x-ratelimit-reset"));
}

#[tokio::test]
async fn test_skip_failed_requests_refunds_quota() {
    let mut config = collaborators::config(1, 10);
    config.api.skip_failed_requests = true;
    let (app, _) = collaborators::seeded(config).await;

    // Not JSON: the handler fails with 415 and the slot is given back.
    for _ in 0..3 {
        let bad = RequestSpec::post("/api/v1/runners/jobs/request", peer()).form("x=1");
        assert_eq!(status(&app, bad).await, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    assert_eq!(status(&app, RequestSpec::get("/api/v1/ping", peer())).await, StatusCode::OK);
    assert_eq!(
        status(&app, RequestSpec::get("/api/v1/ping", peer())).await,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_metrics_endpoint_reports_decisions() {
    let (app, _) = collaborators::seeded(collaborators::config(1, 10)).await;

    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;
    status(&app, RequestSpec::get("/api/v1/ping", peer())).await;

    let response = app
        .clone()
        .oneshot(RequestSpec::get("/metrics", peer()).build())
        .await
        .unwrap();
    let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains(r#"rate_limit_decisions_total{group="api",outcome="admitted"} 1"#));
    assert!(text.contains(r#"rate_limit_decisions_total{group="api",outcome="rejected"} 1"#));
}

#[tokio::test]
async fn test_unusable_config_refused_at_startup() {
    let mut zero_window = collaborators::config(2, 10);
    zero_window.api.window_ms = 0;
    let mut zero_quota = collaborators::config(2, 10);
    zero_quota.activity_pub.max_requests = 0;
    let mut shadowing_metrics = collaborators::config(2, 10);
    shadowing_metrics.metrics.path = "/health".to_string();
    let mut relative_metrics = collaborators::config(2, 10);
    relative_metrics.metrics.path = "metrics".to_string();

    for config in [zero_window, zero_quota, shadowing_metrics, relative_metrics] {
        let result = AppState::new(
            config,
            Arc::new(collaborators::seeded_registry().await),
            Arc::new(collaborators::seeded_authenticator()),
        );
        assert!(matches!(result, Err(SetupError::Config(_))));
    }
}
