//! Per-domain well-known documents: discovery, keys and verifier status.

use crate::context::AppContext;
use crate::documents::{
    DiscoveryDocument, DomainKeyDocument, DomainStatusDocument, ResolverEndpoints, ResolverMode,
    VERSION,
};
use crate::error::ErrorResponse;
use axum::{
    extract::{Host, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// `/.well-known/cryptalias/configuration`: the discovery document for the
/// request host, 404 when the host is not a configured domain.
pub async fn configuration(State(ctx): State<AppContext>, Host(host): Host) -> Response {
    tracing::debug!(host = %host, "well-known request");
    let cfg = ctx.store.get();

    let Some(domain) = cfg.domain(&host) else {
        tracing::warn!(host = %host, "well-known domain not configured");
        return domain_not_found();
    };

    let document = DiscoveryDocument {
        version: VERSION,
        domain: domain.domain.clone(),
        resolver_mode: ResolverMode::Delegated,
        resolver: ResolverEndpoints {
            resolver_endpoint: cfg.base_url.clone(),
            keys_endpoint: None,
        },
        key: domain.jwk(),
    };
    Json(document).into_response()
}

/// `/.well-known/cryptalias/keys`: the single domain key, probed by the
/// verifier alongside the discovery document.
pub async fn keys(State(ctx): State<AppContext>, Host(host): Host) -> Response {
    tracing::debug!(host = %host, "well-known keys request");
    let cfg = ctx.store.get();

    let Some(domain) = cfg.domain(&host) else {
        tracing::warn!(host = %host, "well-known keys domain not configured");
        return domain_not_found();
    };

    Json(DomainKeyDocument {
        domain: domain.domain.clone(),
        key: domain.jwk(),
    })
    .into_response()
}

/// `/.well-known/cryptalias/status`: verifier state for the request host.
pub async fn status(State(ctx): State<AppContext>, Host(host): Host) -> Response {
    let cfg = ctx.store.get();
    ctx.statuses.reconcile(&cfg);

    let Some(domain) = cfg.domain(&host) else {
        return domain_not_found();
    };

    let (_, status) = ctx.statuses.healthy(&domain.domain);
    let document = DomainStatusDocument {
        version: VERSION,
        checked_at: status.last_checked,
        healthy: status.healthy,
        domain: status,
    };
    Json(document).into_response()
}

fn domain_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "NotFound".to_string(),
            message: "domain not configured".to_string(),
        }),
    )
        .into_response()
}
