// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bastion Rate Limiter Service
//!
//! Serves the rate-limited API and federation routes.
//!
//! ## Configuration
//!
//! Configuration is read from the JSON file named by `CONFIG_FILE` (optional)
//! and then overridden from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `API_RATE_WINDOW_MS` / `API_RATE_MAX`: API quota (default: 50 per 10s)
//! - `ACTIVITYPUB_RATE_WINDOW_MS` / `ACTIVITYPUB_RATE_MAX`: federation quota
//!   (default: 500 per 10s)
//! - `API_SKIP_FAILED` / `ACTIVITYPUB_SKIP_FAILED`: refund failed requests
//! - `RATE_LIMIT_STATUS` / `RATE_LIMIT_MESSAGE`: rejection response
//! - `TRUST_FORWARDED_FOR`: key clients by `X-Forwarded-For`
//! - `RUNNER_TOKENS`: `name:token,...` registered automation clients
//! - `ACCESS_TOKENS`: `token:role,...` bearer tokens for the static authenticator

use bastion_rate_limiter::{
    config::Config,
    handlers::{router, AppState},
    registry::{InMemoryTokenRegistry, StaticTokenAuthenticator},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::load()?;
    info!(
        bind_addr = %config.bind_addr,
        runners = config.collaborators.runners.len(),
        access_tokens = config.collaborators.access_tokens.len(),
        "Starting bastion rate limiter"
    );

    let registry = Arc::new(InMemoryTokenRegistry::from_config(&config.collaborators));
    let authenticator = Arc::new(StaticTokenAuthenticator::from_config(&config.collaborators));
    let state = Arc::new(AppState::new(config.clone(), registry, authenticator)?);

    // Spawn cleanup task
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_state.cleanup();
        }
    });

    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
