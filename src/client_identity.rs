//! Per-client identity derivation for caching and rate limiting.
//!
//! A stable client key is derived from request metadata under a configurable
//! strategy. The derived key flows from the HTTP layer into the resolver
//! cache so two clients querying the same alias get independent addresses.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

/// How the per-client base key is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientIdentityStrategy {
    /// Host portion of the remote address.
    RemoteAddress,
    /// First X-Forwarded-For entry, falling back to X-Real-IP, then remote.
    #[default]
    Xff,
    /// `xff` base salted with a truncated User-Agent hash.
    XffUa,
    /// First entry of a configured header.
    Header,
    /// `header` base salted with a truncated User-Agent hash.
    HeaderUa,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClientIdentityConfig {
    #[serde(default)]
    pub strategy: ClientIdentityStrategy,
    #[serde(default)]
    pub header: String,
}

/// Resolved derivation rules for the current config snapshot.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    strategy: ClientIdentityStrategy,
    header: String,
}

impl ClientIdentity {
    pub fn new(cfg: &ClientIdentityConfig) -> Self {
        let header = cfg.header.trim();
        Self {
            strategy: cfg.strategy,
            header: if header.is_empty() {
                "X-Forwarded-For".to_string()
            } else {
                header.to_string()
            },
        }
    }

    /// Derive the client key for a request.
    pub fn key(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
        let mut base = self.base_key(headers);
        if base.is_empty() {
            base = remote_key(remote);
        }
        match self.strategy {
            ClientIdentityStrategy::XffUa | ClientIdentityStrategy::HeaderUa => {
                format!("{base}|ua:{}", hash_ua(user_agent(headers)))
            }
            _ => base,
        }
    }

    fn base_key(&self, headers: &HeaderMap) -> String {
        match self.strategy {
            ClientIdentityStrategy::RemoteAddress => String::new(),
            ClientIdentityStrategy::Header | ClientIdentityStrategy::HeaderUa => {
                header_key(headers, &self.header)
            }
            ClientIdentityStrategy::Xff | ClientIdentityStrategy::XffUa => xff_key(headers),
        }
    }
}

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// First comma-separated entry of a header, trimmed.
fn header_key(headers: &HeaderMap, name: &str) -> String {
    let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
        return String::new();
    };
    value
        .split(',')
        .next()
        .map(str::trim)
        .unwrap_or("")
        .to_string()
}

fn xff_key(headers: &HeaderMap) -> String {
    let v = header_key(headers, "X-Forwarded-For");
    if !v.is_empty() {
        return v;
    }
    // Fall back to the other common proxy header before the remote address.
    header_key(headers, "X-Real-IP")
}

fn remote_key(remote: Option<SocketAddr>) -> String {
    match remote {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Truncated hash so keys stay compact and raw user agents are never stored.
fn hash_ua(ua: &str) -> String {
    let ua = ua.trim();
    if ua.is_empty() {
        return "none".to_string();
    }
    let digest = Sha256::digest(ua.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
