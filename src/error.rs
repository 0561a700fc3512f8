//! Unified error types for the resolution service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Identifier violates the alias grammar or character rules.
    #[error("invalid alias: {0}")]
    InvalidAlias(String),

    /// Identifier's ticker prefix contradicts the request context.
    #[error("ticker mismatch: {0}")]
    TickerMismatch(String),

    /// Domain known but no static entry and no dynamic resolver available.
    #[error("unknown alias")]
    AliasNotFound,

    /// No configured token entry includes the requested ticker.
    #[error("unknown ticker {0:?}")]
    UnknownTicker(String),

    /// Domain is present but gated by the verifier.
    #[error("domain unhealthy: {0}")]
    DomainUnhealthy(String),

    /// Dynamic resolver returned an error or empty address.
    #[error("wallet backend error: {0}")]
    Backend(String),

    /// Save/apply rejected by validation.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    /// Envelope construction failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Client-side verification failure.
    #[error(transparent)]
    Verification(#[from] crate::envelope::VerifyError),

    /// IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error body returned by the HTTP adapter.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ResolverError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ResolverError::InvalidAlias(_) => (StatusCode::BAD_REQUEST, "InvalidAlias"),
            ResolverError::TickerMismatch(_) => (StatusCode::BAD_REQUEST, "TickerMismatch"),
            ResolverError::AliasNotFound => (StatusCode::NOT_FOUND, "AliasNotFound"),
            ResolverError::DomainUnhealthy(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "DomainUnhealthy")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations.
pub type ResolverResult<T> = Result<T, ResolverError>;
