//! The signed resolution endpoint.

use crate::alias;
use crate::client_identity::ClientIdentity;
use crate::context::AppContext;
use crate::envelope::{self, ResolvedAddress};
use crate::error::{ResolverError, ResolverResult};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::net::SocketAddr;

/// `GET /_cryptalias/resolve/{ticker}/{alias}`: parse, gate on domain
/// health, resolve, sign, and emit the compact JWS as `application/jose`.
pub async fn resolve(
    State(ctx): State<AppContext>,
    Path((ticker, raw_alias)): Path<(String, String)>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let raw_alias = raw_alias.trim().to_string();
    tracing::debug!(ticker = %ticker, alias = %raw_alias, "resolve request");

    if raw_alias.is_empty() {
        tracing::warn!("resolve rejected empty identifier");
        return ResolverError::InvalidAlias("empty identifier".to_string()).into_response();
    }
    // A blank ticker segment may be supplied when the identifier carries a
    // ticker prefix of its own.
    let ticker = match effective_ticker(&ticker, &raw_alias) {
        Ok(ticker) => ticker,
        Err(e) => {
            tracing::warn!(alias = %raw_alias, error = %e, "resolve rejected input");
            return e.into_response();
        }
    };

    let cfg = ctx.store.get();
    ctx.statuses.reconcile(&cfg);
    if let Ok(domain) = alias::parse_alias_domain(&raw_alias) {
        let (healthy, status) = ctx.statuses.healthy(&domain);
        if !healthy {
            tracing::warn!(
                domain = %domain,
                message = %status.message,
                "resolve gated unhealthy domain"
            );
            return ResolverError::DomainUnhealthy(status.message).into_response();
        }
    }

    let identity = ClientIdentity::new(&cfg.resolution.client_identity);
    let client_key = identity.key(&headers, connect_info.map(|ci| ci.0));

    let resolved =
        match alias::resolve_alias(&raw_alias, &ticker, &cfg, &ctx.resolver, &client_key).await {
            Ok(resolved) => resolved,
            Err(e @ ResolverError::AliasNotFound) => {
                tracing::warn!(
                    ticker = %ticker,
                    alias = %raw_alias,
                    client = %client_key,
                    "resolve alias not found"
                );
                return e.into_response();
            }
            Err(e @ (ResolverError::InvalidAlias(_) | ResolverError::TickerMismatch(_))) => {
                tracing::warn!(alias = %raw_alias, error = %e, "resolve rejected input");
                return e.into_response();
            }
            Err(e) => {
                tracing::error!(
                    ticker = %ticker,
                    alias = %raw_alias,
                    client = %client_key,
                    error = %e,
                    "resolve failed"
                );
                return e.into_response();
            }
        };

    match sign_response(&cfg, &resolved) {
        Ok(jws) => {
            tracing::debug!(
                ticker = %resolved.wallet.ticker,
                domain = %resolved.domain,
                "resolve response sent"
            );
            ([(header::CONTENT_TYPE, "application/jose")], jws).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "resolve signing failed");
            e.into_response()
        }
    }
}

fn effective_ticker(ticker: &str, raw_alias: &str) -> ResolverResult<String> {
    let ticker = ticker.trim().to_lowercase();
    if !ticker.is_empty() {
        return Ok(ticker);
    }
    match alias::parse_ticker_prefix(raw_alias)? {
        Some(prefix) => Ok(prefix),
        None => Err(ResolverError::InvalidAlias("empty ticker".to_string())),
    }
}

fn sign_response(
    cfg: &crate::config::Config,
    resolved: &alias::ResolvedAlias,
) -> ResolverResult<String> {
    let domain_cfg = cfg
        .domain(&resolved.domain)
        .ok_or(ResolverError::AliasNotFound)?;

    let payload = ResolvedAddress::new(
        &resolved.wallet.ticker,
        &resolved.wallet.address,
        Utc::now(),
    )?;
    let signing_key = domain_cfg.signing_key()?;
    envelope::sign_compact(&payload, &signing_key, Some(&domain_cfg.domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_ticker() {
        assert_eq!(effective_ticker("XMR", "demo$d").unwrap(), "xmr");
        assert_eq!(effective_ticker("", "xmr:demo$d").unwrap(), "xmr");
        assert!(matches!(
            effective_ticker(" ", "demo$d").unwrap_err(),
            ResolverError::InvalidAlias(_)
        ));
        assert!(effective_ticker("", "notanalias").is_err());
    }
}
