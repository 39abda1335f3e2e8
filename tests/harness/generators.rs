// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request builders for router tests.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Builder for requests arriving from a fixed peer address.
pub struct RequestSpec {
    method: Method,
    uri: String,
    peer: IpAddr,
    bearer: Option<String>,
    content_type: Option<&'static str>,
    body: Vec<u8>,
}

impl RequestSpec {
    pub fn get(uri: &str, peer: IpAddr) -> Self {
        Self {
            method: Method::GET,
            uri: uri.to_string(),
            peer,
            bearer: None,
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn post(uri: &str, peer: IpAddr) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(uri, peer)
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.content_type = Some("application/json");
        self.body = body.to_string().into_bytes();
        self
    }

    pub fn form(mut self, body: &str) -> Self {
        self.content_type = Some("application/x-www-form-urlencoded");
        self.body = body.as_bytes().to_vec();
        self
    }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        if let Some(token) = self.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(content_type) = self.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let mut request = builder.body(Body::from(self.body)).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(self.peer, 40_000)));
        request
    }
}
