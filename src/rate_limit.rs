//! Per-client token-bucket rate limiting, hot-reconfigurable from the
//! current config snapshot.

use crate::client_identity::{ClientIdentity, ClientIdentityConfig, ClientIdentityStrategy};
use crate::config::Config;
use crate::context::AppContext;
use crate::error::ErrorResponse;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, Instant};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Entry table bound; beyond this, idle entries are swept on insertion.
const MAX_ENTRIES: usize = 4096;
/// Entries idle longer than this are eligible for the sweep.
const SWEEP_IDLE: Duration = Duration::from_secs(10 * 60);

struct LimiterEntry {
    limiter: DirectLimiter,
    last_seen: Instant,
}

/// The subset of config the limiter is built from. When a request observes a
/// different snapshot, the limiter is rebuilt and all buckets are dropped so
/// changes take effect immediately.
#[derive(Debug, Clone, PartialEq)]
struct RateLimitSnapshot {
    enabled: bool,
    requests_per_minute: u32,
    burst: u32,
    strategy: ClientIdentityStrategy,
    header: String,
}

fn snapshot_from_config(cfg: &Config) -> RateLimitSnapshot {
    let ci = &cfg.resolution.client_identity;
    RateLimitSnapshot {
        enabled: cfg.rate_limit.enabled_or_default(),
        requests_per_minute: cfg.rate_limit.requests_per_minute,
        burst: cfg.rate_limit.burst,
        strategy: ci.strategy,
        header: ci.header.clone(),
    }
}

struct Inner {
    current: Option<RateLimitSnapshot>,
    quota: Quota,
    identity: ClientIdentity,
    entries: HashMap<String, LimiterEntry>,
}

/// Token-bucket limiter keyed by derived client identity. A single mutex
/// guards the snapshot, identity rules and per-client table.
pub struct RequestRateLimiter {
    inner: Mutex<Inner>,
}

impl Default for RequestRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: None,
                quota: Quota::per_minute(NonZeroU32::new(60).unwrap_or(NonZeroU32::MIN))
                    .allow_burst(NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN)),
                identity: ClientIdentity::new(&ClientIdentityConfig::default()),
                entries: HashMap::new(),
            }),
        }
    }

    /// Check a request against the limiter under the given config snapshot.
    /// Returns `true` when the request is allowed.
    pub fn check(&self, cfg: &Config, headers: &HeaderMap, remote: Option<SocketAddr>) -> bool {
        let snapshot = snapshot_from_config(cfg);
        if !snapshot.enabled {
            return true;
        }

        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.refresh_if_needed(snapshot);
        let client = inner.identity.key(headers, remote);
        inner.allow(&client)
    }
}

impl Inner {
    fn refresh_if_needed(&mut self, next: RateLimitSnapshot) {
        if self.current.as_ref() == Some(&next) {
            return;
        }
        // Rate = requests_per_minute / 60 tokens per second, capacity = burst.
        self.quota = Quota::per_minute(
            NonZeroU32::new(next.requests_per_minute).unwrap_or(NonZeroU32::new(60).unwrap()),
        )
        .allow_burst(NonZeroU32::new(next.burst).unwrap_or(NonZeroU32::new(10).unwrap()));
        self.identity = ClientIdentity::new(&ClientIdentityConfig {
            strategy: next.strategy,
            header: next.header.clone(),
        });
        // Limits or identity changed; drop per-client state to avoid drift.
        self.entries.clear();
        tracing::info!(
            rpm = next.requests_per_minute,
            burst = next.burst,
            strategy = ?next.strategy,
            "rate limiter configuration updated"
        );
        self.current = Some(next);
    }

    fn allow(&mut self, client: &str) -> bool {
        let now = Instant::now();
        let quota = self.quota;
        let allowed = {
            let entry = self
                .entries
                .entry(client.to_string())
                .or_insert_with(|| LimiterEntry {
                    limiter: GovernorLimiter::direct(quota),
                    last_seen: now,
                });
            entry.last_seen = now;
            entry.limiter.check().is_ok()
        };

        // Lazy sweep keeps the table bounded without a background task.
        if self.entries.len() > MAX_ENTRIES {
            self.entries
                .retain(|_, entry| now.duration_since(entry.last_seen) < SWEEP_IDLE);
        }

        allowed
    }
}

/// Middleware applying the limiter to the resolve route. Denials surface as
/// 429 before the handler runs.
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Response {
    let cfg = ctx.store.get();
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);

    if !ctx.rate_limiter.check(&cfg, req.headers(), remote) {
        tracing::warn!(path = %req.uri().path(), "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse {
                error: "RateLimitExceeded".to_string(),
                message: "too many requests".to_string(),
            }),
        )
            .into_response();
    }
    next.run(req).await
}
