//! Wire documents published over HTTP: discovery, keys, status and liveness.

use crate::keys::Jwk;
use crate::status::DomainStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol version stamped into every published document and payload.
pub const VERSION: u32 = 0;

/// How clients should resolve aliases for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverMode {
    /// The discovery document points at a separate resolver endpoint.
    Delegated,
    /// Addresses are embedded in the discovery document itself.
    Static,
}

/// Resolver endpoints advertised by the discovery document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverEndpoints {
    pub resolver_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys_endpoint: Option<String>,
}

/// Per-domain discovery document served on
/// `/.well-known/cryptalias/configuration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub version: u32,
    pub domain: String,
    pub resolver_mode: ResolverMode,
    pub resolver: ResolverEndpoints,
    pub key: Jwk,
}

/// Single-key document served on `/.well-known/cryptalias/keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainKeyDocument {
    pub domain: String,
    pub key: Jwk,
}

/// Verifier state served on `/.well-known/cryptalias/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStatusDocument {
    pub version: u32,
    pub checked_at: DateTime<Utc>,
    pub healthy: bool,
    pub domain: DomainStatus,
}

/// Liveness document served on `/healthz`. Always 200 while the process is up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDocument {
    pub status: String,
    pub version: u32,
    pub time: DateTime<Utc>,
    pub overall_ok: bool,
    pub unhealthy_domains: usize,
}
