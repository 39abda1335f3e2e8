// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the bastion rate limiter.
//!
//! Each protected route group gets its own [`RateLimitConfig`]; the two
//! groups shipped by default are the general REST API and the federation
//! (ActivityPub) endpoints.

use crate::bypass::Role;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the rate limiter service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Limits for the general API (`/api/v1`)
    #[serde(default = "default_api_limits")]
    pub api: RateLimitConfig,

    /// Limits for federation endpoints (`/inbox`, `/accounts/{name}/inbox`)
    #[serde(default = "default_activity_pub_limits")]
    pub activity_pub: RateLimitConfig,

    /// Response sent to rejected callers
    #[serde(default)]
    pub rejection: RejectionConfig,

    /// Request inspection settings
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Seed data for the in-process registry and authenticator
    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Quota for one route group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in milliseconds
    pub window_ms: u64,

    /// Maximum counted requests per window per client
    pub max_requests: u32,

    /// Give the quota back when the downstream response is not 2xx/3xx
    #[serde(default)]
    pub skip_failed_requests: bool,
}

/// Rejection response settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionConfig {
    /// HTTP status code (default: 429)
    #[serde(default = "default_status_code")]
    pub status_code: u16,

    /// Response body
    #[serde(default = "default_message")]
    pub message: String,
}

/// How inbound requests are inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// Use the first `X-Forwarded-For` address as the client key (default: false)
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Upper bound on buffered request bodies in bytes (default: 1 MiB)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

/// A registered automation client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerEntry {
    pub name: String,
    pub token: String,
}

/// A bearer token accepted by the static authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenEntry {
    pub token: String,
    pub role: Role,
}

/// Seed data for the in-process collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    #[serde(default)]
    pub runners: Vec<RunnerEntry>,

    #[serde(default)]
    pub access_tokens: Vec<AccessTokenEntry>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_api_limits() -> RateLimitConfig {
    RateLimitConfig::new(10_000, 50)
}

fn default_activity_pub_limits() -> RateLimitConfig {
    RateLimitConfig::new(10_000, 500)
}

fn default_status_code() -> u16 {
    429
}

fn default_message() -> String {
    "Too many requests, please try again later.".to_string()
}

fn default_body_limit() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api: default_api_limits(),
            activity_pub: default_activity_pub_limits(),
            rejection: RejectionConfig::default(),
            ingress: IngressConfig::default(),
            collaborators: CollaboratorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            status_code: default_status_code(),
            message: default_message(),
        }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            trust_forwarded_for: false,
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
            skip_failed_requests: false,
        }
    }

    /// Get the window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject zero-length windows and zero quotas.
    pub fn validate(&self, group: &str) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::invalid(
                format!("{group}.window_ms"),
                "must be greater than zero",
            ));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::invalid(
                format!("{group}.max_requests"),
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from `CONFIG_FILE` (if set) and environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply overrides from a variable lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }

        override_parsed(&lookup, "API_RATE_WINDOW_MS", &mut self.api.window_ms)?;
        override_parsed(&lookup, "API_RATE_MAX", &mut self.api.max_requests)?;
        override_parsed(&lookup, "API_SKIP_FAILED", &mut self.api.skip_failed_requests)?;
        override_parsed(
            &lookup,
            "ACTIVITYPUB_RATE_WINDOW_MS",
            &mut self.activity_pub.window_ms,
        )?;
        override_parsed(
            &lookup,
            "ACTIVITYPUB_RATE_MAX",
            &mut self.activity_pub.max_requests,
        )?;
        override_parsed(
            &lookup,
            "ACTIVITYPUB_SKIP_FAILED",
            &mut self.activity_pub.skip_failed_requests,
        )?;
        override_parsed(&lookup, "RATE_LIMIT_STATUS", &mut self.rejection.status_code)?;
        if let Some(message) = lookup("RATE_LIMIT_MESSAGE") {
            self.rejection.message = message;
        }
        override_parsed(
            &lookup,
            "TRUST_FORWARDED_FOR",
            &mut self.ingress.trust_forwarded_for,
        )?;

        if let Some(raw) = lookup("RUNNER_TOKENS") {
            self.collaborators.runners = parse_pairs("RUNNER_TOKENS", &raw)?
                .into_iter()
                .map(|(name, token)| RunnerEntry { name, token })
                .collect();
        }
        if let Some(raw) = lookup("ACCESS_TOKENS") {
            self.collaborators.access_tokens = parse_pairs("ACCESS_TOKENS", &raw)?
                .into_iter()
                .map(|(token, role)| {
                    role.parse()
                        .map(|role| AccessTokenEntry { token, role })
                        .map_err(|reason| ConfigError::invalid("ACCESS_TOKENS", reason))
                })
                .collect::<Result<_, _>>()?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate("api")?;
        self.activity_pub.validate("activity_pub")?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// Paths owned by the built-in routes.
const RESERVED_PREFIXES: [&str; 5] = ["/health", "/healthz", "/api/v1", "/inbox", "/accounts"];

impl MetricsConfig {
    /// The scrape path must be absolute and must not shadow another route.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if !self.path.starts_with('/') || self.path.len() < 2 {
            return Err(ConfigError::invalid(
                "metrics.path",
                "must start with '/' and name a route",
            ));
        }
        let path = self.path.trim_end_matches('/');
        if RESERVED_PREFIXES
            .iter()
            .any(|reserved| path == *reserved || path.starts_with(&format!("{reserved}/")))
        {
            return Err(ConfigError::invalid(
                "metrics.path",
                format!("{} clashes with a built-in route", self.path),
            ));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))?;
    }
    Ok(())
}

/// Parse `a:b,c:d` lists.
fn parse_pairs(key: &str, raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once(':') {
            Some((left, right)) if !left.is_empty() && !right.is_empty() => {
                Ok((left.to_string(), right.to_string()))
            }
            _ => Err(ConfigError::invalid(key, format!("malformed entry {item:?}"))),
        })
        .collect()
}
