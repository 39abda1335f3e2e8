// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-route-group admission decision.
//!
//! ```text
//! Start -> ResolvingBypass -> Exempt                      (allow, uncounted)
//!                          -> NotExempt -> CheckingWindow -> Admitted | Rejected
//! ```
//!
//! Counters are only touched after a `NotExempt` verdict, so dropping the
//! future while the bypass lookup is pending leaves no state behind.

use crate::bypass::{BypassResolver, BypassVerdict, ExemptionRule};
use crate::config::{RateLimitConfig, RejectionConfig};
use crate::error::ConfigError;
use crate::limiter::{Admission, AdmissionTicket, WindowCounter};
use crate::metrics::{Metrics, Outcome};
use crate::request::AdmissionRequest;
use crate::responder::RejectionResponder;
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Terminal state of [`RateLimitGate::evaluate`].
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Trusted caller; the counter was not consulted
    Exempt(ExemptionRule),
    /// Counted against the quota
    Admitted {
        ticket: AdmissionTicket,
        remaining: u32,
        reset_in: Duration,
    },
    Rejected { retry_after: Duration },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, GateDecision::Rejected { .. })
    }
}

/// Rate limiter for one route group.
pub struct RateLimitGate {
    group: String,
    config: RateLimitConfig,
    counter: WindowCounter,
    resolver: Arc<BypassResolver>,
    responder: RejectionResponder,
    metrics: Arc<Metrics>,
}

impl RateLimitGate {
    pub fn new(
        group: impl Into<String>,
        config: RateLimitConfig,
        rejection: &RejectionConfig,
        resolver: Arc<BypassResolver>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ConfigError> {
        let group = group.into();
        config.validate(&group)?;
        info!(
            group = %group,
            window_ms = config.window_ms,
            max_requests = config.max_requests,
            skip_failed_requests = config.skip_failed_requests,
            "Rate limit gate configured"
        );
        Ok(Self {
            group,
            counter: WindowCounter::new(&config),
            config,
            resolver,
            responder: RejectionResponder::new(rejection),
            metrics,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn counter(&self) -> &WindowCounter {
        &self.counter
    }

    pub fn responder(&self) -> &RejectionResponder {
        &self.responder
    }

    /// Decide whether `request` may proceed.
    pub async fn evaluate(&self, request: &AdmissionRequest) -> GateDecision {
        let resolution = self.resolver.resolve_detailed(request).await;
        for source in &resolution.failures {
            self.metrics.record_lookup_failure(&self.group, *source);
        }

        if let BypassVerdict::Exempt(rule) = resolution.verdict {
            self.metrics.record(&self.group, Outcome::Exempt(rule));
            return GateDecision::Exempt(rule);
        }

        match self.counter.admit(&request.client_key) {
            Admission::Allowed {
                ticket,
                remaining,
                reset_in,
            } => {
                self.metrics.record(&self.group, Outcome::Admitted);
                GateDecision::Admitted {
                    ticket,
                    remaining,
                    reset_in,
                }
            }
            Admission::Denied { retry_after } => {
                debug!(
                    group = %self.group,
                    client = %request.client_key,
                    retry_after_secs = retry_after.as_secs(),
                    "Request rate limited"
                );
                self.metrics.record(&self.group, Outcome::Rejected);
                GateDecision::Rejected { retry_after }
            }
        }
    }

    /// Post-response hook: give the slot back for failed responses when the
    /// group skips failed requests. Anything outside 2xx/3xx counts as failed.
    pub fn complete(&self, ticket: &AdmissionTicket, status: StatusCode) {
        if !self.config.skip_failed_requests {
            return;
        }
        if !(status.is_success() || status.is_redirection()) && self.counter.release(ticket) {
            debug!(group = %self.group, client = %ticket.key(), %status, "Released slot for failed request");
            self.metrics.record(&self.group, Outcome::Released);
        }
    }

    /// Evict idle client state.
    pub fn cleanup(&self) {
        self.counter.cleanup();
    }
}
