//! Persistent per-client cache of dynamically resolved addresses.
//!
//! Entries bind the alias tuple, routing hints and the derived client key so
//! two clients never share a dynamically minted address. Expiry is lazy: a
//! stale entry is dropped the moment a lookup encounters it.

use crate::error::{ResolverError, ResolverResult};
use crate::fsio;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    pub client_key: String,
    pub expires_at: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AddressCacheFile {
    entries: HashMap<String, AddressEntry>,
}

/// Address cache backed by `<config_path>.state.json`.
pub struct AddressCache {
    path: PathBuf,
    // A single lock across all operations: even lookups may delete expired
    // entries, and persistence stays serialized with reads.
    data: Mutex<HashMap<String, AddressEntry>>,
}

/// Derive the state file path for a config path.
pub fn state_path_for(config_path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.state.json", config_path.display()))
}

/// Canonical cache key. Components are constrained to `[a-z0-9.-]`, so `|`
/// cannot collide; the tag and hints may be empty.
pub fn alias_key(
    ticker: &str,
    domain: &str,
    alias: &str,
    tag: &str,
    hints: &str,
    client_key: &str,
) -> String {
    format!("{ticker}|{domain}|{alias}|{tag}|{hints}|{client_key}")
}

impl AddressCache {
    pub fn new(config_path: &Path) -> ResolverResult<Self> {
        let path = state_path_for(config_path);
        let data = load_entries(&path)?;
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let mut data = self
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = data.get(key)?;
        if entry.expires_at > 0 && now.timestamp() >= entry.expires_at {
            data.remove(key);
            return None;
        }
        Some(entry.address.clone())
    }

    /// Store an address under the client-bound key and persist. A persistence
    /// failure is surfaced to the caller, which logs it without failing the
    /// request; the in-memory entry is still used.
    pub fn put(
        &self,
        key: &str,
        address: &str,
        client_key: &str,
        now: DateTime<Utc>,
        ttl_seconds: u64,
    ) -> ResolverResult<()> {
        let mut data = self
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        data.insert(
            key.to_string(),
            AddressEntry {
                address: address.to_string(),
                client_key: client_key.to_string(),
                expires_at: now.timestamp() + ttl_seconds as i64,
            },
        );
        save_entries(&self.path, &data)
    }

    /// Insert an entry directly; used by tests to craft expiry states.
    #[doc(hidden)]
    pub fn insert_raw(&self, key: &str, entry: AddressEntry) {
        let mut data = self
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        data.insert(key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_entries(path: &Path) -> ResolverResult<HashMap<String, AddressEntry>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };

    if let Ok(file) = serde_json::from_slice::<AddressCacheFile>(&data) {
        return Ok(file.entries);
    }

    // Older state files stored bare address strings with no expiry.
    #[derive(Deserialize)]
    struct Legacy {
        #[serde(default)]
        entries: HashMap<String, String>,
    }
    let legacy: Legacy = serde_json::from_slice(&data).map_err(|e| {
        ResolverError::Internal(format!("parse state file {}: {e}", path.display()))
    })?;
    Ok(legacy
        .entries
        .into_iter()
        .map(|(key, address)| {
            (
                key,
                AddressEntry {
                    address,
                    client_key: String::new(),
                    expires_at: 0,
                },
            )
        })
        .collect())
}

fn save_entries(path: &Path, entries: &HashMap<String, AddressEntry>) -> ResolverResult<()> {
    #[derive(Serialize)]
    struct FileRef<'a> {
        entries: &'a HashMap<String, AddressEntry>,
    }
    let data = serde_json::to_vec_pretty(&FileRef { entries })
        .map_err(|e| ResolverError::Internal(format!("encode state file: {e}")))?;
    fsio::atomic_write(path, &data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cache_in(dir: &tempfile::TempDir) -> AddressCache {
        AddressCache::new(&dir.path().join("config.yml")).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let now = Utc::now();

        let key = alias_key("xmr", "127.0.0.1", "demo", "", "", "client-a");
        cache.put(&key, "addr-1", "client-a", now, 60).unwrap();
        assert_eq!(cache.get(&key, now), Some("addr-1".to_string()));

        // A different client key is a different entry.
        let other = alias_key("xmr", "127.0.0.1", "demo", "", "", "client-b");
        assert_eq!(cache.get(&other, now), None);
    }

    #[test]
    fn test_expired_entry_deleted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let now = Utc::now();

        cache.put("k", "addr", "c", now, 60).unwrap();
        assert!(cache.get("k", now + Duration::seconds(59)).is_some());
        assert!(cache.get("k", now + Duration::seconds(60)).is_none());
        // The lookup removed it.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_expiry_never_expires() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        cache.insert_raw(
            "k",
            AddressEntry {
                address: "addr".to_string(),
                client_key: String::new(),
                expires_at: 0,
            },
        );
        let later = Utc::now() + Duration::days(365);
        assert_eq!(cache.get("k", later), Some("addr".to_string()));
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yml");
        let now = Utc::now();

        let cache = AddressCache::new(&config_path).unwrap();
        cache.put("k", "addr", "c", now, 600).unwrap();
        drop(cache);

        let cache = AddressCache::new(&config_path).unwrap();
        assert_eq!(cache.get("k", now), Some("addr".to_string()));
    }

    #[test]
    fn test_legacy_state_file_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yml");
        let state_path = state_path_for(&config_path);
        std::fs::write(&state_path, r#"{"entries":{"k":"legacy-addr"}}"#).unwrap();

        let cache = AddressCache::new(&config_path).unwrap();
        // Legacy entries carry no expiry and survive indefinitely.
        let later = Utc::now() + Duration::days(30);
        assert_eq!(cache.get("k", later), Some("legacy-addr".to_string()));
    }

    #[test]
    fn test_corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yml");
        std::fs::write(state_path_for(&config_path), "{not json").unwrap();
        assert!(AddressCache::new(&config_path).is_err());
    }

    #[test]
    fn test_alias_key_shape() {
        let key = alias_key("xmr", "d", "a", "t", "ai=2", "c");
        assert_eq!(key, "xmr|d|a|t|ai=2|c");
        let no_tag = alias_key("xmr", "d", "a", "", "", "c");
        assert_eq!(no_tag, "xmr|d|a|||c");
    }
}
