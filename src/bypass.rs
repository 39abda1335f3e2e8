// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Exemption decisions for trusted callers.
//!
//! Rules are evaluated in [`EXEMPTION_ORDER`] and the first match wins:
//!
//! 1. A body token that the automation registry knows.
//! 2. An optionally-authenticated caller holding a privileged role.
//!
//! Every failure on this path (unknown token, malformed field, registry or
//! auth backend error) yields [`BypassVerdict::NotExempt`]. Nothing here
//! ever grants an exemption by default.

use crate::error::{AuthError, RegistryError};
use crate::request::{AdmissionRequest, AutomationTokenField, Credentials};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Account role resolved by authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Unprivileged,
    Moderator,
    Administrator,
}

impl Role {
    /// Roles that skip rate limiting.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Moderator | Role::Administrator)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "unprivileged" => Ok(Role::Unprivileged),
            "moderator" => Ok(Role::Moderator),
            "administrator" | "admin" => Ok(Role::Administrator),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// Who the caller turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub authenticated: bool,
    pub role: Role,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            role: Role::Unprivileged,
        }
    }

    pub fn authenticated(role: Role) -> Self {
        Self {
            authenticated: true,
            role,
        }
    }
}

/// A known automation client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    pub name: String,
}

/// Lookup of automation tokens.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    async fn lookup_token(&self, token: &str) -> Result<Option<RegisteredClient>, RegistryError>;
}

/// Optional authentication: `None` credentials resolve to an anonymous caller.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<CallerIdentity, AuthError>;
}

/// A named exemption rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExemptionRule {
    RegisteredAutomationClient,
    PrivilegedRole,
}

impl ExemptionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegisteredAutomationClient => "automation",
            Self::PrivilegedRole => "privileged",
        }
    }
}

impl fmt::Display for ExemptionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rules in priority order.
pub const EXEMPTION_ORDER: [ExemptionRule; 2] = [
    ExemptionRule::RegisteredAutomationClient,
    ExemptionRule::PrivilegedRole,
];

/// Result of [`BypassResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassVerdict {
    Exempt(ExemptionRule),
    NotExempt,
}

/// Where a lookup failure came from, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Registry,
    Authentication,
}

impl LookupSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Authentication => "authentication",
        }
    }
}

/// Outcome of evaluating one rule.
enum RuleOutcome {
    Matched,
    NotApplicable,
    Failed(LookupSource),
}

/// Decides whether a request skips the quota.
pub struct BypassResolver {
    registry: Arc<dyn TokenRegistry>,
    authenticator: Arc<dyn Authenticator>,
}

/// A verdict plus the lookup failures seen while reaching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub verdict: BypassVerdict,
    pub failures: Vec<LookupSource>,
}

impl BypassResolver {
    pub fn new(registry: Arc<dyn TokenRegistry>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            registry,
            authenticator,
        }
    }

    /// Resolve the exemption verdict for a request.
    pub async fn resolve(&self, request: &AdmissionRequest) -> BypassVerdict {
        self.resolve_detailed(request).await.verdict
    }

    /// Like [`resolve`](Self::resolve), also reporting absorbed failures.
    pub async fn resolve_detailed(&self, request: &AdmissionRequest) -> Resolution {
        let mut failures = Vec::new();

        for rule in EXEMPTION_ORDER {
            match self.evaluate(rule, request).await {
                RuleOutcome::Matched => {
                    debug!(client = %request.client_key, %rule, "Request exempt from rate limit");
                    return Resolution {
                        verdict: BypassVerdict::Exempt(rule),
                        failures,
                    };
                }
                RuleOutcome::NotApplicable => {}
                RuleOutcome::Failed(source) => failures.push(source),
            }
        }

        Resolution {
            verdict: BypassVerdict::NotExempt,
            failures,
        }
    }

    async fn evaluate(&self, rule: ExemptionRule, request: &AdmissionRequest) -> RuleOutcome {
        match rule {
            ExemptionRule::RegisteredAutomationClient => {
                self.check_automation_token(request).await
            }
            ExemptionRule::PrivilegedRole => self.check_privileged_role(request).await,
        }
    }

    async fn check_automation_token(&self, request: &AdmissionRequest) -> RuleOutcome {
        let token = match &request.automation_token {
            AutomationTokenField::Present(token) => token,
            AutomationTokenField::Malformed => {
                debug!(client = %request.client_key, "Malformed automation token treated as absent");
                return RuleOutcome::NotApplicable;
            }
            AutomationTokenField::Absent => return RuleOutcome::NotApplicable,
        };

        match self.registry.lookup_token(token).await {
            Ok(Some(client)) => {
                debug!(client = %request.client_key, runner = %client.name, "Registered automation client");
                RuleOutcome::Matched
            }
            Ok(None) => {
                debug!(client = %request.client_key, "Unregistered automation token");
                RuleOutcome::NotApplicable
            }
            Err(err) => {
                warn!(client = %request.client_key, error = %err, "Token registry lookup failed, not exempting");
                RuleOutcome::Failed(LookupSource::Registry)
            }
        }
    }

    async fn check_privileged_role(&self, request: &AdmissionRequest) -> RuleOutcome {
        match self
            .authenticator
            .authenticate(request.credentials.as_ref())
            .await
        {
            Ok(identity) if identity.authenticated && identity.role.is_privileged() => {
                RuleOutcome::Matched
            }
            Ok(_) => RuleOutcome::NotApplicable,
            Err(AuthError::InvalidCredentials) => {
                debug!(client = %request.client_key, "Invalid credentials, treating caller as anonymous");
                RuleOutcome::NotApplicable
            }
            Err(err) => {
                warn!(client = %request.client_key, error = %err, "Authentication failed, not exempting");
                RuleOutcome::Failed(LookupSource::Authentication)
            }
        }
    }
}
