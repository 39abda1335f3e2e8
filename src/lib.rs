// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bastion Rate Limiter
//!
//! Request admission control for the REST API and federation endpoints:
//!
//! - Fixed-window quota per client (network origin by default)
//! - Independent quotas per route group
//! - Registered automation clients bypass the quota
//! - Authenticated moderators and administrators bypass the quota
//! - Fail-closed exemption checks
//! - Optional refund of quota for failed responses

pub mod bypass;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod registry;
pub mod request;
pub mod responder;

pub use bypass::{BypassResolver, BypassVerdict, ExemptionRule, Role};
pub use config::{Config, RateLimitConfig};
pub use gate::{GateDecision, RateLimitGate};
pub use limiter::{Admission, WindowCounter};
pub use request::{AdmissionRequest, ClientKey};
