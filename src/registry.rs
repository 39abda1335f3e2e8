// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-process collaborators backing the bypass rules.
//!
//! Deployments with an external runner store or auth service implement
//! [`TokenRegistry`] and [`Authenticator`] themselves; these versions are
//! seeded from [`CollaboratorConfig`].

use crate::bypass::{Authenticator, CallerIdentity, RegisteredClient, Role, TokenRegistry};
use crate::config::CollaboratorConfig;
use crate::error::{AuthError, RegistryError};
use crate::request::Credentials;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// Automation clients keyed by token.
#[derive(Default)]
pub struct InMemoryTokenRegistry {
    clients: RwLock<HashMap<String, RegisteredClient>>,
}

impl InMemoryTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CollaboratorConfig) -> Self {
        let clients = config
            .runners
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    RegisteredClient {
                        name: entry.name.clone(),
                    },
                )
            })
            .collect();
        Self {
            clients: RwLock::new(clients),
        }
    }

    pub async fn register(&self, name: impl Into<String>, token: impl Into<String>) {
        let name = name.into();
        info!(runner = %name, "Registering automation client");
        self.clients
            .write()
            .await
            .insert(token.into(), RegisteredClient { name });
    }

    /// Returns whether the token was known.
    pub async fn revoke(&self, token: &str) -> bool {
        self.clients.write().await.remove(token).is_some()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[async_trait]
impl TokenRegistry for InMemoryTokenRegistry {
    async fn lookup_token(&self, token: &str) -> Result<Option<RegisteredClient>, RegistryError> {
        Ok(self.clients.read().await.get(token).cloned())
    }
}

/// Bearer tokens mapped to roles.
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Role>,
}

impl StaticTokenAuthenticator {
    pub fn from_config(config: &CollaboratorConfig) -> Self {
        Self {
            tokens: config
                .access_tokens
                .iter()
                .map(|entry| (entry.token.clone(), entry.role))
                .collect(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, role: Role) -> Self {
        self.tokens.insert(token.into(), role);
        self
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<CallerIdentity, AuthError> {
        let Some(credentials) = credentials else {
            return Ok(CallerIdentity::anonymous());
        };
        self.tokens
            .get(&credentials.bearer)
            .map(|role| CallerIdentity::authenticated(*role))
            .ok_or(AuthError::InvalidCredentials)
    }
}
