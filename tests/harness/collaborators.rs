// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Stub registry and authenticator implementations.

use async_trait::async_trait;
use bastion_rate_limiter::{
    bypass::{Authenticator, CallerIdentity, RegisteredClient, TokenRegistry},
    config::Config,
    error::{AuthError, RegistryError},
    handlers::{router, AppState},
    registry::{InMemoryTokenRegistry, StaticTokenAuthenticator},
    request::Credentials,
    Role,
};
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const RUNNER_TOKEN: &str = "runner-secret";
pub const ADMIN_BEARER: &str = "admin-bearer";
pub const MODERATOR_BEARER: &str = "moderator-bearer";
pub const USER_BEARER: &str = "user-bearer";

/// Registry whose storage is down.
#[derive(Default)]
pub struct FailingRegistry {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenRegistry for FailingRegistry {
    async fn lookup_token(&self, _token: &str) -> Result<Option<RegisteredClient>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RegistryError::Storage("connection reset".to_string()))
    }
}

/// Registry that answers after a delay, to widen race windows.
pub struct SlowRegistry {
    pub inner: InMemoryTokenRegistry,
    pub delay: Duration,
}

#[async_trait]
impl TokenRegistry for SlowRegistry {
    async fn lookup_token(&self, token: &str) -> Result<Option<RegisteredClient>, RegistryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.lookup_token(token).await
    }
}

/// Authenticator whose backend is unreachable.
pub struct FailingAuthenticator;

#[async_trait]
impl Authenticator for FailingAuthenticator {
    async fn authenticate(
        &self,
        _credentials: Option<&Credentials>,
    ) -> Result<CallerIdentity, AuthError> {
        Err(AuthError::Backend("auth service timeout".to_string()))
    }
}

pub async fn seeded_registry() -> InMemoryTokenRegistry {
    let registry = InMemoryTokenRegistry::new();
    registry.register("ci-runner", RUNNER_TOKEN).await;
    registry
}

pub fn seeded_authenticator() -> StaticTokenAuthenticator {
    StaticTokenAuthenticator::default()
        .with_token(ADMIN_BEARER, Role::Administrator)
        .with_token(MODERATOR_BEARER, Role::Moderator)
        .with_token(USER_BEARER, Role::Unprivileged)
}

/// Config with small quotas for both groups.
pub fn config(api_max: u32, activity_pub_max: u32) -> Config {
    let mut config = Config::default();
    config.api.window_ms = 60_000;
    config.api.max_requests = api_max;
    config.activity_pub.window_ms = 60_000;
    config.activity_pub.max_requests = activity_pub_max;
    config
}

pub fn build(
    config: Config,
    registry: Arc<dyn TokenRegistry>,
    authenticator: Arc<dyn Authenticator>,
) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, registry, authenticator).unwrap());
    (router(state.clone()), state)
}

/// Router over the seeded in-memory collaborators.
pub async fn seeded(config: Config) -> (Router, Arc<AppState>) {
    build(
        config,
        Arc::new(seeded_registry().await),
        Arc::new(seeded_authenticator()),
    )
}
