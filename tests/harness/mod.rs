// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for driving the rate-limited router.
//!
//! Provides stub collaborators, request builders and an outcome tally.

#![allow(dead_code)]

pub mod collaborators;
pub mod generators;
pub mod metrics;
