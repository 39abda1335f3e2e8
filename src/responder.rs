// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Response sent to rejected callers.

use crate::config::RejectionConfig;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::warn;

/// Writes the configured rejection status and message.
#[derive(Debug, Clone)]
pub struct RejectionResponder {
    status: StatusCode,
    message: String,
}

impl RejectionResponder {
    /// An unusable configured status degrades to 429.
    pub fn new(config: &RejectionConfig) -> Self {
        let status = match StatusCode::from_u16(config.status_code) {
            Ok(status) if status.is_client_error() || status.is_server_error() => status,
            _ => {
                warn!(
                    status_code = config.status_code,
                    "Invalid rejection status, falling back to 429"
                );
                StatusCode::TOO_MANY_REQUESTS
            }
        };
        Self {
            status,
            message: config.message.clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn respond(&self, retry_after: Duration) -> Response {
        let mut response = (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message.clone(),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
        response
    }
}

/// Whole seconds, rounded up so clients never retry early.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
