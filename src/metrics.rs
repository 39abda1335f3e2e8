// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for gate decisions.

use crate::bypass::{ExemptionRule, LookupSource};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Decision outcome label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exempt(ExemptionRule),
    Admitted,
    Rejected,
    Released,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Exempt(ExemptionRule::RegisteredAutomationClient) => "exempt_automation",
            Outcome::Exempt(ExemptionRule::PrivilegedRole) => "exempt_privileged",
            Outcome::Admitted => "admitted",
            Outcome::Rejected => "rejected",
            Outcome::Released => "released",
        }
    }
}

/// Counters shared by every gate in the process.
pub struct Metrics {
    registry: Registry,
    decisions: IntCounterVec,
    lookup_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new(
                "rate_limit_decisions_total",
                "Rate limit decisions by route group and outcome",
            ),
            &["group", "outcome"],
        )?;
        let lookup_failures = IntCounterVec::new(
            Opts::new(
                "rate_limit_lookup_failures_total",
                "Exemption lookups that failed and fell back to the quota",
            ),
            &["group", "source"],
        )?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(lookup_failures.clone()))?;

        Ok(Self {
            registry,
            decisions,
            lookup_failures,
        })
    }

    pub fn record(&self, group: &str, outcome: Outcome) {
        self.decisions
            .with_label_values(&[group, outcome.label()])
            .inc();
    }

    pub fn record_lookup_failure(&self, group: &str, source: LookupSource) {
        self.lookup_failures
            .with_label_values(&[group, source.as_str()])
            .inc();
    }

    pub fn decision_count(&self, group: &str, outcome: Outcome) -> u64 {
        self.decisions
            .with_label_values(&[group, outcome.label()])
            .get()
    }

    /// Render all counters in the Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
