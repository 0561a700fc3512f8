//! Verifying client: fetches a domain's discovery document, resolves an
//! alias, and verifies the signed response end-to-end.

use crate::alias;
use crate::documents::DiscoveryDocument;
use crate::envelope;
use crate::error::{ResolverError, ResolverResult};
use chrono::Utc;
use reqwest::header;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A verified resolution, ready to print.
#[derive(Debug, Clone)]
pub struct ResolvedOutcome {
    pub alias: String,
    pub ticker: String,
    pub address: String,
}

/// Resolve `alias` (of the form `[ticker:]alias[+tag]$domain`) for `ticker`,
/// verifying the JWS against the key published in the domain's discovery
/// document and enforcing `expires`.
pub async fn resolve_address(ticker: &str, alias: &str) -> ResolverResult<ResolvedOutcome> {
    let alias = alias.trim();
    let ticker = ticker.trim().to_lowercase();
    if alias.is_empty() || ticker.is_empty() {
        return Err(ResolverError::InvalidAlias(
            "ticker and alias are required".to_string(),
        ));
    }
    if let Some(prefix) = alias::parse_ticker_prefix(alias)? {
        if prefix != ticker {
            return Err(ResolverError::TickerMismatch(format!(
                "prefix {prefix:?} does not match {ticker:?}"
            )));
        }
    }
    let domain = alias::parse_alias_domain(alias)?;

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ResolverError::Internal(format!("http client: {e}")))?;

    // Discovery is always fetched over HTTPS from the alias's own domain.
    let discovery_url = format!("https://{domain}/.well-known/cryptalias/configuration");
    let discovery: DiscoveryDocument = client
        .get(&discovery_url)
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| ResolverError::Backend(format!("fetch configuration: {e}")))?
        .error_for_status()
        .map_err(|e| ResolverError::Backend(format!("fetch configuration: {e}")))?
        .json()
        .await
        .map_err(|e| ResolverError::Backend(format!("decode configuration: {e}")))?;

    let resolver_endpoint = discovery.resolver.resolver_endpoint.trim_end_matches('/');
    if resolver_endpoint.is_empty() {
        return Err(ResolverError::Backend(
            "missing resolver_endpoint in configuration".to_string(),
        ));
    }
    let verifying_key = discovery.key.verifying_key()?;

    let resolve_url = format!(
        "{}/_cryptalias/resolve/{}/{}",
        resolver_endpoint,
        urlencoding::encode(&ticker),
        urlencoding::encode(alias)
    );
    let jws = client
        .get(&resolve_url)
        .header(header::ACCEPT, "application/jose")
        .send()
        .await
        .map_err(|e| ResolverError::Backend(format!("fetch resolution: {e}")))?
        .error_for_status()
        .map_err(|e| ResolverError::Backend(format!("fetch resolution: {e}")))?
        .text()
        .await
        .map_err(|e| ResolverError::Backend(format!("read resolution: {e}")))?;

    let verified = envelope::verify_compact(&jws, &verifying_key, Utc::now())?;
    Ok(ResolvedOutcome {
        alias: alias.to_string(),
        ticker,
        address: verified.address,
    })
}
