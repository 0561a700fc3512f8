//! Shared application context handed to the HTTP handlers.

use crate::config_store::ConfigStore;
use crate::rate_limit::RequestRateLimiter;
use crate::status::DomainStatusStore;
use crate::wallet::WalletResolver;
use std::sync::Arc;

/// Owner of the long-lived services. Ownership is strictly downward:
/// handlers borrow the stores and resolver, never the other way around.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<ConfigStore>,
    pub statuses: Arc<DomainStatusStore>,
    pub resolver: Arc<WalletResolver>,
    pub rate_limiter: Arc<RequestRateLimiter>,
}

impl AppContext {
    pub fn new(
        store: Arc<ConfigStore>,
        statuses: Arc<DomainStatusStore>,
        resolver: Arc<WalletResolver>,
        rate_limiter: Arc<RequestRateLimiter>,
    ) -> Self {
        Self {
            store,
            statuses,
            resolver,
            rate_limiter,
        }
    }
}
