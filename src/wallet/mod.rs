//! Dynamic wallet resolution.
//!
//! When the static alias table misses, resolution dispatches to a wallet
//! backend selected by the token's endpoint type (and, for internal
//! backends, by ticker). Results are cached per client with a TTL so
//! repeated lookups do not exhaust backends that mint a fresh address per
//! call.

mod external;
mod monero;

pub use external::HttpWalletBackend;
pub use monero::MoneroWalletBackend;

use crate::address_cache::{self, AddressCache};
use crate::config::{Config, TokenConfig, TokenEndpointConfig, TokenEndpointType};
use crate::error::{ResolverError, ResolverResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Input to a dynamic resolution, including optional routing hints carried
/// over from a keyless static alias entry.
#[derive(Debug, Clone, Default)]
pub struct DynamicAliasInput {
    pub ticker: String,
    pub alias: String,
    pub tag: String,
    pub domain: String,
    pub account_index: Option<u64>,
    pub account_id: Option<String>,
    pub wallet_id: Option<String>,
}

impl DynamicAliasInput {
    /// Canonical rendering of the routing hints for the cache key. Empty
    /// means "no hints" and still participates in the key.
    pub fn routing_hints_key(&self) -> String {
        let mut parts = Vec::new();
        if let Some(index) = self.account_index {
            parts.push(format!("ai={index}"));
        }
        if let Some(id) = self.account_id.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("aid={id}"));
        }
        if let Some(id) = self.wallet_id.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("wid={id}"));
        }
        parts.join("|")
    }
}

/// A wallet backend able to produce an address for an alias. Kept narrow on
/// purpose: routing hints travel in the input, not as options.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    async fn get_address(
        &self,
        endpoint: &TokenEndpointConfig,
        input: &DynamicAliasInput,
    ) -> ResolverResult<String>;
}

/// Dispatches dynamic resolutions and enforces per-client TTL caching.
pub struct WalletResolver {
    cache: AddressCache,
    external: Arc<dyn WalletBackend>,
    /// Internal adapters, registered per ticker.
    internal: HashMap<String, Arc<dyn WalletBackend>>,
}

impl WalletResolver {
    /// Build the production resolver: persistent cache next to the config
    /// file, HTTP external backend, and the embedded Monero adapter.
    pub fn new(config_path: &Path) -> ResolverResult<Self> {
        let cache = AddressCache::new(config_path)?;
        let mut internal: HashMap<String, Arc<dyn WalletBackend>> = HashMap::new();
        internal.insert("xmr".to_string(), Arc::new(MoneroWalletBackend::new()?));
        Ok(Self {
            cache,
            external: Arc::new(HttpWalletBackend::new()?),
            internal,
        })
    }

    /// Build a resolver with explicit backends (used by tests).
    pub fn with_backends(
        cache: AddressCache,
        external: Arc<dyn WalletBackend>,
        internal: HashMap<String, Arc<dyn WalletBackend>>,
    ) -> Self {
        Self {
            cache,
            external,
            internal,
        }
    }

    /// Resolve dynamically via the configured endpoint, serving the
    /// per-client cache first.
    pub async fn resolve(
        &self,
        cfg: &Config,
        input: &DynamicAliasInput,
        client_key: &str,
    ) -> ResolverResult<String> {
        let token = find_token_config(cfg, &input.ticker)?;

        let now = Utc::now();
        let key = address_cache::alias_key(
            &input.ticker,
            &input.domain,
            &input.alias,
            &input.tag,
            &input.routing_hints_key(),
            client_key,
        );
        if let Some(address) = self.cache.get(&key, now) {
            tracing::debug!(
                ticker = %input.ticker,
                domain = %input.domain,
                client = %client_key,
                "dynamic resolve cache hit"
            );
            return Ok(address);
        }

        tracing::debug!(
            ticker = %input.ticker,
            domain = %input.domain,
            endpoint_type = ?token.endpoint.endpoint_type,
            client = %client_key,
            "dynamic resolve start"
        );

        let address = match token.endpoint.endpoint_type {
            TokenEndpointType::Internal => {
                let backend = self.internal.get(input.ticker.as_str()).ok_or_else(|| {
                    ResolverError::Backend(format!(
                        "no internal resolver for ticker {:?}",
                        input.ticker
                    ))
                })?;
                backend.get_address(&token.endpoint, input).await?
            }
            TokenEndpointType::External => {
                self.external.get_address(&token.endpoint, input).await?
            }
        };
        if address.is_empty() {
            return Err(ResolverError::Backend(
                "wallet resolver returned empty address".to_string(),
            ));
        }

        if let Err(e) = self.cache.put(
            &key,
            &address,
            client_key,
            now,
            cfg.resolution.ttl_seconds,
        ) {
            tracing::warn!(error = %e, "dynamic resolve cache store failed");
        }
        Ok(address)
    }

    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }
}

fn find_token_config(cfg: &Config, ticker: &str) -> ResolverResult<TokenConfig> {
    let ticker = ticker.trim().to_lowercase();
    cfg.tokens
        .iter()
        .find(|t| t.tickers.iter().any(|tk| tk.trim().to_lowercase() == ticker))
        .cloned()
        .ok_or(ResolverError::UnknownTicker(ticker))
}
