//! Periodic self-verification of configured domains.
//!
//! The verifier probes the service's own well-known endpoints (with the Host
//! header overridden per domain) and the domain's DNS records, and publishes
//! the outcome to the status store. Unhealthy domains are gated from
//! resolution until a later pass succeeds.

use crate::config::{AliasDomainConfig, Config};
use crate::config_store::ConfigStore;
use crate::error::{ResolverError, ResolverResult};
use crate::keys::{self, Jwk};
use crate::status::{DomainStatus, DomainStatusStore};
use chrono::Utc;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use reqwest::header;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_INTERVAL_MINUTES: u64 = 5;

pub struct DomainVerifier {
    store: Arc<ConfigStore>,
    statuses: Arc<DomainStatusStore>,
    client: reqwest::Client,
    resolver: TokioAsyncResolver,
    interval: Duration,
}

impl DomainVerifier {
    pub fn new(
        store: Arc<ConfigStore>,
        statuses: Arc<DomainStatusStore>,
        interval_minutes: u64,
    ) -> ResolverResult<Self> {
        let interval_minutes = if interval_minutes == 0 {
            DEFAULT_INTERVAL_MINUTES
        } else {
            interval_minutes
        };
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ResolverError::Internal(format!("verifier http client: {e}")))?;
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
        });
        Ok(Self {
            store,
            statuses,
            client,
            resolver,
            interval: Duration::from_secs(interval_minutes * 60),
        })
    }

    /// Run verification passes until the token is cancelled. The first pass
    /// starts immediately.
    pub fn start(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => self.run_once().await,
                }
            }
        })
    }

    pub async fn run_once(&self) {
        let cfg = self.store.get();
        self.statuses.reconcile(&cfg);
        for domain_cfg in &cfg.domains {
            let status = self.verify_domain(&cfg, domain_cfg).await;
            if status.healthy {
                tracing::info!(domain = %status.domain, "domain verification ok");
            } else {
                tracing::error!(
                    domain = %status.domain,
                    message = %status.message,
                    "domain verification failed"
                );
            }
            self.statuses.update(status);
        }
    }

    async fn verify_domain(&self, cfg: &Config, domain_cfg: &AliasDomainConfig) -> DomainStatus {
        let mut status = DomainStatus {
            domain: domain_cfg.domain.to_lowercase(),
            healthy: true,
            message: String::new(),
            last_checked: Utc::now(),
            well_known_ok: false,
            jwks_ok: false,
            dns_resolves: false,
            dns_txt_ok: false,
        };
        let fail = |mut status: DomainStatus, message: String| {
            status.healthy = false;
            status.message = message;
            status
        };

        let base = match reqwest::Url::parse(&cfg.base_url) {
            Ok(url) if url.host_str().is_some() => url,
            _ => return fail(status, "invalid base_url; cannot verify domain".to_string()),
        };

        if let Err(e) = self
            .check_document(&base, "/.well-known/cryptalias/configuration", domain_cfg)
            .await
        {
            return fail(status, format!("well-known check failed: {e}"));
        }
        status.well_known_ok = true;

        if let Err(e) = self
            .check_document(&base, "/.well-known/cryptalias/keys", domain_cfg)
            .await
        {
            return fail(status, format!("domain keys check failed: {e}"));
        }
        status.jwks_ok = true;

        if !should_check_dns(&domain_cfg.domain) {
            status.dns_resolves = true;
            status.dns_txt_ok = true;
            status.message = "dns checks skipped for local domain".to_string();
            return status;
        }

        if let Err(e) = self.check_dns_resolution(&domain_cfg.domain).await {
            return fail(status, format!("dns resolution failed: {e}"));
        }
        status.dns_resolves = true;

        if let Err(e) = self.check_dns_txt(domain_cfg).await {
            return fail(status, format!("dns txt check failed: {e}"));
        }
        status.dns_txt_ok = true;

        status.message = "ok".to_string();
        status
    }

    /// Fetch a well-known document over the base URL with the Host header
    /// overridden to the domain, and require its domain and key to match.
    async fn check_document(
        &self,
        base: &reqwest::Url,
        path: &str,
        domain_cfg: &AliasDomainConfig,
    ) -> Result<(), String> {
        let mut url = base.clone();
        url.set_path(path);
        url.set_query(None);
        url.set_fragment(None);

        let response = self
            .client
            .get(url)
            .header(header::HOST, &domain_cfg.domain)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.trim().chars().take(512).collect();
            return Err(format!("status {}: {snippet}", status.as_u16()));
        }

        #[derive(Deserialize)]
        struct Probe {
            #[serde(default)]
            domain: String,
            key: Option<Jwk>,
        }
        let probe: Probe = response
            .json()
            .await
            .map_err(|e| format!("decode response: {e}"))?;

        if !probe.domain.trim().eq_ignore_ascii_case(&domain_cfg.domain) {
            return Err(format!("domain mismatch: got {:?}", probe.domain));
        }
        let key = probe.key.ok_or_else(|| "missing key".to_string())?;
        ensure_key_matches_domain(&key, domain_cfg)
    }

    async fn check_dns_resolution(&self, domain: &str) -> Result<(), String> {
        let lookup = self
            .resolver
            .lookup_ip(domain)
            .await
            .map_err(|e| e.to_string())?;
        if lookup.iter().next().is_none() {
            return Err("no A/AAAA records".to_string());
        }
        Ok(())
    }

    async fn check_dns_txt(&self, domain_cfg: &AliasDomainConfig) -> Result<(), String> {
        let name = format!("_cryptalias.{}.", domain_cfg.domain);
        let lookup = self
            .resolver
            .txt_lookup(name)
            .await
            .map_err(|e| e.to_string())?;

        let records: Vec<String> = lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|segment| String::from_utf8_lossy(segment).into_owned())
                    .collect::<String>()
            })
            .collect();
        if records.is_empty() {
            return Err("no TXT records found".to_string());
        }

        let expected = domain_cfg.public_key.as_bytes();
        for record in &records {
            if let Some(key) = decode_dns_txt_pubkey(record) {
                if key == expected {
                    return Ok(());
                }
            }
        }
        Err(format!(
            "expected {:?}, got {:?}",
            domain_cfg.dns_txt_value(),
            records.join(", ")
        ))
    }
}

/// Require the JWK's kid and key bytes to match the configured domain.
fn ensure_key_matches_domain(key: &Jwk, domain_cfg: &AliasDomainConfig) -> Result<(), String> {
    match &key.kid {
        Some(kid) if kid.eq_ignore_ascii_case(&domain_cfg.domain) => {}
        other => return Err(format!("kid mismatch: got {other:?}")),
    }
    let bytes = key
        .public_key_bytes()
        .map_err(|e| format!("export public key: {e}"))?;
    if bytes != domain_cfg.public_key.as_bytes() {
        return Err("public key mismatch".to_string());
    }
    Ok(())
}

/// DNS checks are skipped for IP literals and localhost-style names.
pub(crate) fn should_check_dns(domain: &str) -> bool {
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() {
        return false;
    }
    if domain.parse::<IpAddr>().is_ok() {
        return false;
    }
    if domain == "localhost" || domain.ends_with(".localhost") {
        return false;
    }
    true
}

/// Extract a published public key from a TXT record value. Some providers
/// return multiple values in one record separated by commas.
pub(crate) fn decode_dns_txt_pubkey(record: &str) -> Option<Vec<u8>> {
    let record = record.trim();
    if record.is_empty() {
        return None;
    }
    for part in record.split(',') {
        let part = part.trim();
        let part = part.strip_prefix("pubkey=").unwrap_or(part);
        if let Some(key) = keys::decode_base64_key(part) {
            return Some(key);
        }
    }
    None
}
