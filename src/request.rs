// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! What the limiter needs to know about an inbound request.
//!
//! An [`AdmissionRequest`] is extracted once per request from the HTTP head
//! and the buffered body, then handed to the gate. Nothing here fails: bad
//! input degrades to "absent".

use axum::extract::ConnectInfo;
use axum::http::{header, request::Parts, HeaderMap};
use serde_json::Value;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// Body field carrying the automation client token.
pub const AUTOMATION_TOKEN_FIELD: &str = "runnerToken";

/// Bucket identity for rate-limit counting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Key shared by requests with no discoverable origin.
    pub fn unknown() -> Self {
        Self("unknown".to_string())
    }

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the key from the peer address, or from `X-Forwarded-For` when
    /// the deployment sits behind a trusted proxy.
    pub fn from_parts(parts: &Parts, trust_forwarded_for: bool) -> Self {
        if trust_forwarded_for {
            if let Some(ip) = forwarded_ip(&parts.headers) {
                return Self::from(ip);
            }
        }

        match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Self::from(addr.ip()),
            None => {
                debug!("No peer address on request, using shared key");
                Self::unknown()
            }
        }
    }
}

impl From<IpAddr> for ClientKey {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// The automation token field as found in the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationTokenField {
    /// Field missing, empty, `null` or `false`
    Absent,
    /// Field present with an unusable shape
    Malformed,
    Present(String),
}

impl AutomationTokenField {
    /// Read the token from a JSON document.
    pub fn from_json(body: &Value) -> Self {
        match body.get(AUTOMATION_TOKEN_FIELD) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Self::Absent,
            Some(Value::String(token)) if token.is_empty() => Self::Absent,
            Some(Value::String(token)) => Self::Present(token.clone()),
            Some(other) => {
                debug!(kind = json_kind(other), "Ignoring non-string automation token");
                Self::Malformed
            }
        }
    }

    /// Read the token from an `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &[u8]) -> Self {
        let mut values = url::form_urlencoded::parse(body)
            .filter(|(name, _)| name == AUTOMATION_TOKEN_FIELD)
            .map(|(_, value)| value.into_owned());

        match (values.next(), values.next()) {
            (None, _) => Self::Absent,
            (Some(_), Some(_)) => {
                debug!("Ignoring repeated automation token field");
                Self::Malformed
            }
            (Some(token), None) if token.is_empty() => Self::Absent,
            (Some(token), None) => Self::Present(token),
        }
    }

    /// Pick a parser from the `Content-Type` header.
    pub fn from_body(headers: &HeaderMap, body: &[u8]) -> Self {
        if body.is_empty() {
            return Self::Absent;
        }

        let media_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_lowercase());

        match media_type.as_deref() {
            Some("application/json") => match serde_json::from_slice::<Value>(body) {
                Ok(doc) => Self::from_json(&doc),
                Err(err) => {
                    debug!(error = %err, "Unparseable JSON body");
                    Self::Absent
                }
            },
            Some("application/x-www-form-urlencoded") => Self::from_form(body),
            _ => Self::Absent,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Present(token) => Some(token),
            Self::Absent | Self::Malformed => None,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Credentials presented for optional authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bearer: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// `Authorization: Bearer <token>`; anything else counts as no credentials.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return None;
        }
        Some(Self {
            bearer: token.to_string(),
        })
    }
}

/// Everything the gate inspects for one request.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub client_key: ClientKey,
    pub automation_token: AutomationTokenField,
    pub credentials: Option<Credentials>,
}

impl AdmissionRequest {
    /// Anonymous request from `client_key`.
    pub fn anonymous(client_key: ClientKey) -> Self {
        Self {
            client_key,
            automation_token: AutomationTokenField::Absent,
            credentials: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.automation_token = AutomationTokenField::Present(token.into());
        self
    }

    pub fn with_bearer(mut self, bearer: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            bearer: bearer.into(),
        });
        self
    }

    /// Build from the request head and its buffered body.
    pub fn from_http(parts: &Parts, body: &[u8], trust_forwarded_for: bool) -> Self {
        Self {
            client_key: ClientKey::from_parts(parts, trust_forwarded_for),
            automation_token: AutomationTokenField::from_body(&parts.headers, body),
            credentials: Credentials::from_headers(&parts.headers),
        }
    }
}
