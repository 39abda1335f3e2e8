// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outcome tallies for flood simulations.

use axum::http::StatusCode;
use std::collections::HashMap;

/// Counts responses by status.
#[derive(Debug, Default)]
pub struct OutcomeTally {
    by_status: HashMap<StatusCode, usize>,
}

impl OutcomeTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, status: StatusCode) {
        *self.by_status.entry(status).or_insert(0) += 1;
    }

    pub fn count(&self, status: StatusCode) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn allowed(&self) -> usize {
        self.by_status
            .iter()
            .filter(|(status, _)| status.is_success())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn total(&self) -> usize {
        self.by_status.values().sum()
    }
}
