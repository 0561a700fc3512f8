//! Runtime configuration: data model, normalization, validation, load/save.
//!
//! The config is loaded from a YAML file, treated as immutable once applied
//! to the [`crate::config_store::ConfigStore`], and replaced wholesale on
//! reload.

use crate::client_identity::{ClientIdentityConfig, ClientIdentityStrategy};
use crate::error::{ResolverError, ResolverResult};
use crate::fsio;
use crate::keys::{
    self, PrivateKey, PublicKey, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN,
};
use crate::logging;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

/// Full runtime configuration loaded from `config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub public_port: u16,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub domains: Vec<AliasDomainConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Defaults to enabled when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub requests_per_minute: u32,
    #[serde(default)]
    pub burst: u32,
}

impl RateLimitConfig {
    pub fn enabled_or_default(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// How long a per-client resolved address is reused.
    #[serde(default)]
    pub ttl_seconds: u64,
    /// How "same client" is derived for caching and limits.
    #[serde(default)]
    pub client_identity: ClientIdentityConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub interval_minutes: u64,
}

/// A domain served by this resolver, with its signing keypair and static
/// alias table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasDomainConfig {
    pub domain: String,
    #[serde(default)]
    pub private_key: PrivateKey,
    #[serde(default)]
    pub public_key: PublicKey,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<WalletAlias>,
}

impl AliasDomainConfig {
    /// Generate a keypair for a keyless domain. Returns whether keys were
    /// created (and therefore need persisting).
    pub fn generate_keys(&mut self) -> bool {
        if !self.private_key.is_empty() || !self.public_key.is_empty() {
            return false;
        }
        let (public, private) = keys::generate_keypair();
        self.public_key = public;
        self.private_key = private;
        tracing::info!(
            domain = %self.domain,
            record = %self.dns_txt_record(),
            "generated keys for domain; add DNS TXT record"
        );
        true
    }

    pub fn jwk(&self) -> keys::Jwk {
        keys::Jwk::from_public_key(&self.public_key, &self.domain)
    }

    pub fn signing_key(&self) -> ResolverResult<ed25519_dalek::SigningKey> {
        self.private_key.signing_key()
    }

    /// TXT record value that publishes this domain's public key.
    pub fn dns_txt_value(&self) -> String {
        keys::dns_txt_value(&self.public_key)
    }

    /// Ready-to-copy DNS TXT record line.
    pub fn dns_txt_record(&self) -> String {
        keys::dns_txt_record(&self.domain, &self.public_key)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletAlias {
    pub alias: String,
    pub wallet: WalletAddressConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<WalletTag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletTag {
    pub tag: String,
    pub wallet: WalletAddressConfig,
}

/// A wallet entry. An empty address with routing hints delegates to the
/// dynamic resolver, forwarding the hints to the wallet backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletAddressConfig {
    pub ticker: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<String>,
}

fn normalize_wallet_address(w: &mut WalletAddressConfig) {
    w.ticker = w.ticker.trim().to_lowercase();
    w.address = w.address.trim().to_string();
    if let Some(id) = &w.account_id {
        w.account_id = Some(id.trim().to_string());
    }
    if let Some(id) = &w.wallet_id {
        w.wallet_id = Some(id.trim().to_string());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub tickers: Vec<String>,
    pub endpoint: TokenEndpointConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenEndpointType {
    Internal,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEndpointConfig {
    #[serde(default)]
    pub address: String,
    #[serde(rename = "type")]
    pub endpoint_type: TokenEndpointType,
    /// Token/username/password are forwarded as auth metadata to external
    /// wallet services.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Wallet file/password are used by internal integrations (e.g. Monero).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub wallet_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub wallet_password: String,
}

impl Config {
    /// Fill defaults and stabilize casing/whitespace so matching is uniform
    /// across requests. Idempotent. Returns whether keys were generated and
    /// the config therefore needs persisting.
    pub fn normalize(&mut self) -> bool {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        self.logging.level = {
            let level = self.logging.level.trim().to_lowercase();
            if level.is_empty() {
                "info".to_string()
            } else {
                level
            }
        };
        if self.rate_limit.requests_per_minute == 0 {
            self.rate_limit.requests_per_minute = 60;
        }
        if self.rate_limit.burst == 0 {
            self.rate_limit.burst = 10;
        }
        if self.resolution.ttl_seconds == 0 {
            self.resolution.ttl_seconds = 60;
        }
        if self.resolution.client_identity.header.trim().is_empty() {
            self.resolution.client_identity.header = "X-Forwarded-For".to_string();
        }
        if self.verify.interval_minutes == 0 {
            self.verify.interval_minutes = 5;
        }

        let mut generated = false;
        for domain in &mut self.domains {
            domain.domain = domain.domain.trim().to_lowercase();
            for alias in &mut domain.aliases {
                alias.alias = alias.alias.trim().to_lowercase();
                normalize_wallet_address(&mut alias.wallet);
                for tag in &mut alias.tags {
                    tag.tag = tag.tag.trim().to_lowercase();
                    normalize_wallet_address(&mut tag.wallet);
                }
            }
            if domain.generate_keys() {
                generated = true;
            }
        }
        for token in &mut self.tokens {
            for ticker in &mut token.tickers {
                *ticker = ticker.trim().to_lowercase();
            }
        }
        generated
    }

    /// Check that the normalized config is internally consistent.
    pub fn validate(&self) -> ResolverResult<()> {
        let invalid = |msg: String| Err(ResolverError::ConfigInvalid(msg));

        if self.base_url.is_empty() {
            return invalid("base_url is required".into());
        }
        if self.public_port == 0 {
            return invalid("public_port must be set".into());
        }
        if logging::parse_level(&self.logging.level).is_none() {
            return invalid("logging.level must be one of: debug, info, warn, error".into());
        }
        if self.rate_limit.enabled_or_default() {
            if self.rate_limit.requests_per_minute == 0 {
                return invalid("rate_limit.requests_per_minute must be > 0".into());
            }
            if self.rate_limit.burst == 0 {
                return invalid("rate_limit.burst must be > 0".into());
            }
        }
        if self.resolution.ttl_seconds == 0 {
            return invalid("resolution.ttl_seconds must be > 0".into());
        }
        let ci = &self.resolution.client_identity;
        if matches!(
            ci.strategy,
            ClientIdentityStrategy::Header | ClientIdentityStrategy::HeaderUa
        ) && ci.header.trim().is_empty()
        {
            return invalid(
                "resolution.client_identity.header is required when strategy is header or header_ua"
                    .into(),
            );
        }
        if self.domains.is_empty() {
            return invalid("at least one domain is required".into());
        }
        for (i, d) in self.domains.iter().enumerate() {
            if d.domain.is_empty() {
                return invalid(format!("domains[{i}].domain is required"));
            }
            if d.public_key.len() != PUBLIC_KEY_LEN {
                return invalid(format!("domains[{i}].public_key must be {PUBLIC_KEY_LEN} bytes"));
            }
            if d.private_key.len() != PRIVATE_KEY_LEN {
                return invalid(format!(
                    "domains[{i}].private_key must be {PRIVATE_KEY_LEN} bytes"
                ));
            }
        }
        if self.tokens.is_empty() {
            return invalid("at least one token (cryptocurrency / asset) is required".into());
        }
        for (i, t) in self.tokens.iter().enumerate() {
            if t.name.is_empty() {
                return invalid(format!("tokens[{i}].name is required"));
            }
            if t.tickers.is_empty() {
                return invalid(format!(
                    "at least one tokens[{i}].tickers is required, i.e. xmr, btc etc."
                ));
            }
            if t.endpoint.address.is_empty() {
                return invalid(format!("tokens[{i}].endpoint.address is required"));
            }
        }
        Ok(())
    }

    /// Look up a configured domain by request host (port stripped, lowercased).
    pub fn domain(&self, host: &str) -> Option<&AliasDomainConfig> {
        let host = normalize_host(host);
        self.domains.iter().find(|d| d.domain == host)
    }
}

/// Lowercase a request host and strip any `:port` suffix.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    if let Some(stripped) = host.strip_prefix('[') {
        // Bracketed IPv6 literal, possibly with a port.
        if let Some(end) = stripped.find(']') {
            return stripped[..end].to_string();
        }
    }
    match host.rsplit_once(':') {
        Some((h, port))
            if !h.is_empty() && !h.contains(':') && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            h.to_string()
        }
        _ => host,
    }
}

/// The configuration written on first run when no file exists yet.
pub fn default_config() -> Config {
    Config {
        base_url: "http://127.0.0.1:8080".to_string(),
        public_port: 8080,
        logging: LoggingConfig {
            level: "info".to_string(),
        },
        rate_limit: RateLimitConfig {
            enabled: Some(true),
            requests_per_minute: 60,
            burst: 10,
        },
        resolution: ResolutionConfig {
            ttl_seconds: 60,
            client_identity: ClientIdentityConfig {
                strategy: ClientIdentityStrategy::Xff,
                header: "X-Forwarded-For".to_string(),
            },
        },
        verify: VerifyConfig {
            interval_minutes: 5,
        },
        domains: vec![AliasDomainConfig {
            domain: "127.0.0.1".to_string(),
            ..Default::default()
        }],
        tokens: vec![TokenConfig {
            name: "Monero".to_string(),
            tickers: vec!["xmr".to_string()],
            endpoint: TokenEndpointConfig {
                address: "cryptalias-monero:50051".to_string(),
                endpoint_type: TokenEndpointType::External,
                token: String::new(),
                username: String::new(),
                password: String::new(),
                wallet_file: String::new(),
                wallet_password: String::new(),
            },
        }],
    }
}

/// Load the config from disk, normalizing it. Generated keys are persisted
/// immediately so subsequent reloads are deterministic.
pub fn load_config(path: &Path) -> ResolverResult<Config> {
    let data = std::fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&data).map_err(|e| {
        ResolverError::ConfigInvalid(format!("parse {}: {e}", path.display()))
    })?;
    if cfg.normalize() {
        save_config(path, &mut cfg)?;
    }
    Ok(cfg)
}

/// Normalize and atomically persist the config (temp file + rename, 0600).
pub fn save_config(path: &Path, cfg: &mut Config) -> ResolverResult<()> {
    cfg.normalize();
    let data = serde_yaml::to_string(cfg)
        .map_err(|e| ResolverError::ConfigInvalid(format!("encode config: {e}")))?;
    fsio::atomic_write(path, data.as_bytes())?;
    Ok(())
}

/// Load the config, writing `default` on first run.
pub fn load_or_create_config(path: &Path, default: &Config) -> ResolverResult<Config> {
    match load_config(path) {
        Ok(cfg) => Ok(cfg),
        Err(ResolverError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            let mut cfg = default.clone();
            save_config(path, &mut cfg)?;
            Ok(cfg)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        let mut cfg = default_config();
        cfg.normalize();
        cfg
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let mut cfg = Config {
            base_url: "http://example.com/".to_string(),
            public_port: 8080,
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            resolution: ResolutionConfig::default(),
            verify: VerifyConfig::default(),
            domains: vec![AliasDomainConfig {
                domain: "Example.COM".to_string(),
                ..Default::default()
            }],
            tokens: vec![],
        };
        let generated = cfg.normalize();
        assert!(generated);
        assert_eq!(cfg.base_url, "http://example.com");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.rate_limit.requests_per_minute, 60);
        assert_eq!(cfg.rate_limit.burst, 10);
        assert_eq!(cfg.resolution.ttl_seconds, 60);
        assert_eq!(cfg.verify.interval_minutes, 5);
        assert_eq!(cfg.domains[0].domain, "example.com");
        assert_eq!(cfg.domains[0].public_key.len(), PUBLIC_KEY_LEN);
        assert_eq!(cfg.domains[0].private_key.len(), PRIVATE_KEY_LEN);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut cfg = test_config();
        let once = serde_yaml::to_string(&cfg).unwrap();
        assert!(!cfg.normalize());
        let twice = serde_yaml::to_string(&cfg).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_lowercases_matching_keys() {
        let mut cfg = test_config();
        cfg.domains[0].aliases = vec![WalletAlias {
            alias: "Demo ".to_string(),
            wallet: WalletAddressConfig {
                ticker: "XMR".to_string(),
                address: " addr-root ".to_string(),
                ..Default::default()
            },
            tags: vec![WalletTag {
                tag: "TIP".to_string(),
                wallet: WalletAddressConfig {
                    ticker: "Xmr".to_string(),
                    address: "addr-tag".to_string(),
                    ..Default::default()
                },
            }],
        }];
        cfg.normalize();
        let alias = &cfg.domains[0].aliases[0];
        assert_eq!(alias.alias, "demo");
        assert_eq!(alias.wallet.ticker, "xmr");
        assert_eq!(alias.wallet.address, "addr-root");
        assert_eq!(alias.tags[0].tag, "tip");
        assert_eq!(alias.tags[0].wallet.ticker, "xmr");
    }

    #[test]
    fn test_validate_rejects_missing_pieces() {
        let mut cfg = test_config();
        cfg.base_url = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.public_port = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.logging.level = "verbose".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.domains.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.tokens.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.domains[0].public_key = PublicKey::from_bytes(vec![0u8; 16]);
        assert!(cfg.validate().is_err());

        let mut cfg = test_config();
        cfg.resolution.client_identity.strategy = ClientIdentityStrategy::Header;
        cfg.resolution.client_identity.header = "  ".to_string();
        assert!(cfg.validate().is_err());

        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_rate_limit_enabled_default() {
        let rl = RateLimitConfig::default();
        assert!(rl.enabled_or_default());
        let rl = RateLimitConfig {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(!rl.enabled_or_default());
    }

    #[test]
    fn test_domain_lookup_strips_port() {
        let cfg = test_config();
        assert!(cfg.domain("127.0.0.1").is_some());
        assert!(cfg.domain("127.0.0.1:8080").is_some());
        assert!(cfg.domain("other.example").is_none());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM"), "example.com");
        assert_eq!(normalize_host("example.com:8080"), "example.com");
        assert_eq!(normalize_host("127.0.0.1:443"), "127.0.0.1");
        assert_eq!(normalize_host("[::1]:8080"), "::1");
        assert_eq!(normalize_host("[::1]"), "::1");
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");

        let cfg = load_or_create_config(&path, &default_config()).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.public_port, 8080);

        // The persisted file round-trips with generated keys intact.
        let reloaded = load_config(&path).unwrap();
        assert_eq!(
            reloaded.domains[0].public_key,
            cfg.domains[0].public_key
        );
    }

    #[test]
    fn test_generated_keys_persist_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");

        let mut cfg = default_config();
        cfg.domains[0].public_key = PublicKey::default();
        cfg.domains[0].private_key = PrivateKey::default();
        std::fs::write(&path, serde_yaml::to_string(&cfg).unwrap()).unwrap();

        let first = load_config(&path).unwrap();
        assert_eq!(first.domains[0].public_key.len(), PUBLIC_KEY_LEN);

        let second = load_config(&path).unwrap();
        assert_eq!(
            first.domains[0].public_key,
            second.domains[0].public_key
        );
    }

    #[test]
    fn test_yaml_roundtrip_preserves_structure() {
        let mut cfg = test_config();
        cfg.domains[0].aliases = vec![WalletAlias {
            alias: "demo".to_string(),
            wallet: WalletAddressConfig {
                ticker: "xmr".to_string(),
                account_index: Some(3),
                ..Default::default()
            },
            tags: vec![],
        }];
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.domains[0].aliases[0].wallet.account_index, Some(3));
        assert_eq!(
            parsed.domains[0].public_key,
            cfg.domains[0].public_key
        );
    }
}
