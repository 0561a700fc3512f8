//! Cryptalias - signed cryptocurrency-address resolution service.
//!
//! Publishes, per configured domain, a well-known discovery document and a
//! signed resolver endpoint that maps `[ticker:]alias[+tag]$domain`
//! identifiers to wallet addresses. Responses are compact JWS tokens (EdDSA /
//! Ed25519) so clients can verify authenticity without trusting the
//! transport.

pub mod address_cache;
pub mod alias;
pub mod api;
pub mod client;
pub mod client_identity;
pub mod config;
pub mod config_store;
pub mod config_watch;
pub mod context;
pub mod documents;
pub mod envelope;
pub mod error;
mod fsio;
pub mod keys;
pub mod logging;
pub mod rate_limit;
pub mod server;
pub mod status;
pub mod verify;
pub mod wallet;
