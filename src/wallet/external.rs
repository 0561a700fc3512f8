//! External wallet service client: a narrow JSON-over-HTTP RPC.
//!
//! The wire contract is `GetAddress(WalletAddressRequest) ->
//! WalletAddressResponse{address}` with optional `authorization` metadata
//! (Bearer token, or Basic credentials). Transport is plain HTTP by default;
//! deployments are expected to keep wallet services inside a trusted network
//! segment.

use crate::config::TokenEndpointConfig;
use crate::error::{ResolverError, ResolverResult};
use crate::wallet::{DynamicAliasInput, WalletBackend};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub struct WalletAddressRequest<'a> {
    pub ticker: &'a str,
    pub alias: &'a str,
    pub tag: &'a str,
    pub domain: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct WalletAddressResponse {
    #[serde(default)]
    pub address: String,
}

/// HTTP client for external wallet services.
pub struct HttpWalletBackend {
    client: reqwest::Client,
}

impl HttpWalletBackend {
    pub fn new() -> ResolverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ResolverError::Internal(format!("wallet http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WalletBackend for HttpWalletBackend {
    async fn get_address(
        &self,
        endpoint: &TokenEndpointConfig,
        input: &DynamicAliasInput,
    ) -> ResolverResult<String> {
        let url = format!("{}/v1/wallet/address", endpoint_base(&endpoint.address));
        let request = WalletAddressRequest {
            ticker: &input.ticker,
            alias: &input.alias,
            tag: &input.tag,
            domain: &input.domain,
            account_index: input.account_index,
            account_id: input.account_id.as_deref(),
            wallet_id: input.wallet_id.as_deref(),
        };

        let response = apply_endpoint_auth(self.client.post(&url), endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ResolverError::Backend(format!("wallet service request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::Backend(format!(
                "wallet service returned status {}",
                status.as_u16()
            )));
        }

        let body: WalletAddressResponse = response
            .json()
            .await
            .map_err(|e| ResolverError::Backend(format!("wallet service response: {e}")))?;
        if body.address.is_empty() {
            return Err(ResolverError::Backend(
                "wallet service returned empty address".to_string(),
            ));
        }
        Ok(body.address)
    }
}

/// Accept bare `host:port` endpoint addresses as well as full URLs.
pub(crate) fn endpoint_base(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// Attach `authorization` metadata: Bearer when a token is set, Basic when
/// credentials are set, nothing otherwise.
pub(crate) fn apply_endpoint_auth(
    request: reqwest::RequestBuilder,
    endpoint: &TokenEndpointConfig,
) -> reqwest::RequestBuilder {
    if !endpoint.token.is_empty() {
        return request.header(header::AUTHORIZATION, format!("Bearer {}", endpoint.token));
    }
    if !endpoint.username.is_empty() || !endpoint.password.is_empty() {
        let credentials = STANDARD.encode(format!("{}:{}", endpoint.username, endpoint.password));
        return request.header(header::AUTHORIZATION, format!("Basic {credentials}"));
    }
    request
}
