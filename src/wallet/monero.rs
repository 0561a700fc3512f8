//! Embedded Monero adapter speaking the monero-wallet-rpc JSON-RPC protocol.

use crate::config::TokenEndpointConfig;
use crate::error::{ResolverError, ResolverResult};
use crate::wallet::external::endpoint_base;
use crate::wallet::{DynamicAliasInput, WalletBackend};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Internal per-ticker adapter for XMR. All calls are serialized:
/// monero-wallet-rpc can only have one wallet open at a time.
pub struct MoneroWalletBackend {
    client: reqwest::Client,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'a str,
    id: &'a str,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct CreateAddressResult {
    #[serde(default)]
    address: String,
}

impl MoneroWalletBackend {
    pub fn new() -> ResolverResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ResolverError::Internal(format!("monero http client: {e}")))?;
        Ok(Self {
            client,
            lock: Mutex::new(()),
        })
    }

    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &TokenEndpointConfig,
        method: &str,
        params: P,
    ) -> ResolverResult<R> {
        let url = format!("{}/json_rpc", endpoint_base(&endpoint.address));
        let mut request = self.client.post(&url).json(&RpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method,
            params,
        });
        if !endpoint.username.is_empty() || !endpoint.password.is_empty() {
            let credentials =
                STANDARD.encode(format!("{}:{}", endpoint.username, endpoint.password));
            request = request.header(header::AUTHORIZATION, format!("Basic {credentials}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResolverError::Backend(format!("monero wallet rpc: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::Backend(format!(
                "monero wallet rpc returned status {}",
                status.as_u16()
            )));
        }
        let body: RpcResponse<R> = response
            .json()
            .await
            .map_err(|e| ResolverError::Backend(format!("monero wallet rpc response: {e}")))?;
        if let Some(error) = body.error {
            return Err(ResolverError::Backend(format!(
                "monero wallet rpc {method} failed: {} ({})",
                error.message, error.code
            )));
        }
        body.result.ok_or_else(|| {
            ResolverError::Backend(format!("monero wallet rpc {method} returned no result"))
        })
    }
}

#[async_trait]
impl WalletBackend for MoneroWalletBackend {
    async fn get_address(
        &self,
        endpoint: &TokenEndpointConfig,
        input: &DynamicAliasInput,
    ) -> ResolverResult<String> {
        // One wallet open at a time across all requests.
        let _guard = self.lock.lock().await;

        let opened = if !endpoint.wallet_file.trim().is_empty() {
            self.call::<_, serde_json::Value>(
                endpoint,
                "open_wallet",
                json!({
                    "filename": endpoint.wallet_file,
                    "password": endpoint.wallet_password,
                }),
            )
            .await?;
            true
        } else {
            false
        };

        let mut label = format!("{}:{}", input.domain, input.alias);
        if !input.tag.is_empty() {
            label = format!("{label}+{}", input.tag);
        }
        let result = self
            .call::<_, CreateAddressResult>(
                endpoint,
                "create_address",
                json!({
                    "account_index": input.account_index.unwrap_or(0),
                    "label": label,
                }),
            )
            .await;

        if opened {
            // Best effort; leaving the wallet open only delays the next call.
            let _ = self
                .call::<_, serde_json::Value>(endpoint, "close_wallet", json!({}))
                .await;
        }

        let result = result?;
        if result.address.is_empty() {
            return Err(ResolverError::Backend(
                "monero wallet rpc returned empty address".to_string(),
            ));
        }
        Ok(result.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_request_shape() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: "0",
            method: "create_address",
            params: json!({"account_index": 0, "label": "d:a"}),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["jsonrpc"], "2.0");
        assert_eq!(encoded["method"], "create_address");
        assert_eq!(encoded["params"]["label"], "d:a");
    }

    #[test]
    fn test_rpc_error_decoding() {
        let body: RpcResponse<CreateAddressResult> = serde_json::from_str(
            r#"{"error":{"code":-1,"message":"no wallet open"}}"#,
        )
        .unwrap();
        assert!(body.result.is_none());
        assert_eq!(body.error.unwrap().message, "no wallet open");
    }
}
