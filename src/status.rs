//! Domain health state shared between the verifier and request handlers.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Health of a configured domain as observed by the periodic verifier. When
/// `healthy` is false, resolution is gated for that domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStatus {
    pub domain: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_checked: DateTime<Utc>,

    pub well_known_ok: bool,
    pub jwks_ok: bool,
    pub dns_resolves: bool,
    pub dns_txt_ok: bool,
}

impl DomainStatus {
    /// Initial state for a domain that has not been verified yet. Treated as
    /// healthy so resolution is not gated before the first verifier pass.
    pub fn unverified(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            healthy: true,
            message: "not yet verified".to_string(),
            last_checked: Utc::now(),
            well_known_ok: false,
            jwks_ok: false,
            dns_resolves: false,
            dns_txt_ok: false,
        }
    }

    /// Placeholder for hosts that are configured but not (yet) tracked.
    pub fn untracked(domain: &str) -> Self {
        Self {
            message: "domain not tracked".to_string(),
            ..Self::unverified(domain)
        }
    }
}

/// Domain health store, separate from config so the verifier and request
/// handlers can coordinate safely.
#[derive(Default)]
pub struct DomainStatusStore {
    statuses: RwLock<HashMap<String, DomainStatus>>,
}

impl DomainStatusStore {
    pub fn new(cfg: &Config) -> Self {
        let store = Self::default();
        store.reconcile(cfg);
        store
    }

    /// Track exactly the currently configured domains: removed domains drop
    /// out, new ones start unverified.
    pub fn reconcile(&self, cfg: &Config) {
        let configured: HashMap<String, ()> = cfg
            .domains
            .iter()
            .map(|d| d.domain.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .map(|d| (d, ()))
            .collect();

        let mut statuses = self
            .statuses
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        statuses.retain(|domain, _| configured.contains_key(domain));
        for domain in configured.keys() {
            statuses
                .entry(domain.clone())
                .or_insert_with(|| DomainStatus::unverified(domain));
        }
    }

    pub fn update(&self, mut status: DomainStatus) {
        status.domain = status.domain.trim().to_lowercase();
        if status.domain.is_empty() {
            return;
        }
        let mut statuses = self
            .statuses
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        statuses.insert(status.domain.clone(), status);
    }

    pub fn get(&self, domain: &str) -> Option<DomainStatus> {
        let domain = domain.trim().to_lowercase();
        self.statuses
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&domain)
            .cloned()
    }

    /// Whether resolution should proceed for a domain. Untracked domains are
    /// treated as healthy (a race with reconcile, not an outage).
    pub fn healthy(&self, domain: &str) -> (bool, DomainStatus) {
        match self.get(domain) {
            Some(status) => (status.healthy, status),
            None => (true, DomainStatus::untracked(&domain.trim().to_lowercase())),
        }
    }

    /// Sorted snapshot for status pages and the liveness document.
    pub fn list(&self) -> Vec<DomainStatus> {
        let mut out: Vec<DomainStatus> = self
            .statuses
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        out.sort_by(|a, b| a.domain.cmp(&b.domain));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, AliasDomainConfig};

    #[test]
    fn test_reconcile_tracks_configured_domains() {
        let mut cfg = default_config();
        cfg.normalize();
        let store = DomainStatusStore::new(&cfg);

        let (healthy, status) = store.healthy("127.0.0.1");
        assert!(healthy);
        assert_eq!(status.message, "not yet verified");

        // Add a domain and reconcile.
        cfg.domains.push(AliasDomainConfig {
            domain: "alt.example".to_string(),
            ..Default::default()
        });
        store.reconcile(&cfg);
        assert!(store.get("alt.example").is_some());

        // Remove it again; the entry drops out.
        cfg.domains.pop();
        store.reconcile(&cfg);
        assert!(store.get("alt.example").is_none());
    }

    #[test]
    fn test_update_and_gate() {
        let mut cfg = default_config();
        cfg.normalize();
        let store = DomainStatusStore::new(&cfg);

        let mut status = DomainStatus::unverified("127.0.0.1");
        status.healthy = false;
        status.message = "dns txt mismatch".to_string();
        store.update(status);

        let (healthy, status) = store.healthy("127.0.0.1");
        assert!(!healthy);
        assert_eq!(status.message, "dns txt mismatch");
    }

    #[test]
    fn test_untracked_domain_is_healthy() {
        let store = DomainStatusStore::default();
        let (healthy, status) = store.healthy("nowhere.example");
        assert!(healthy);
        assert_eq!(status.message, "domain not tracked");
    }

    #[test]
    fn test_list_is_sorted() {
        let store = DomainStatusStore::default();
        store.update(DomainStatus::unverified("b.example"));
        store.update(DomainStatus::unverified("a.example"));
        let domains: Vec<String> = store.list().into_iter().map(|s| s.domain).collect();
        assert_eq!(domains, vec!["a.example", "b.example"]);
    }
}
