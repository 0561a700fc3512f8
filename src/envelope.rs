//! Signed resolution envelope: payload construction and compact JWS handling.
//!
//! The response body of a resolve request is a compact JWS
//! (`protected.payload.signature`, base64url without padding) over the
//! [`ResolvedAddress`] JSON, signed with the domain's Ed25519 key (EdDSA).

use crate::documents::VERSION;
use crate::error::{ResolverError, ResolverResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long a signed resolution stays valid.
const RESPONSE_VALIDITY_SECONDS: i64 = 60;

/// The signed body of a resolve response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub version: u32,
    pub ticker: String,
    pub address: String,
    pub expires: DateTime<Utc>,
    // An older schema serialized the nonce under "string"; emit "nonce" but
    // keep accepting both on input.
    #[serde(alias = "string")]
    pub nonce: String,
}

impl ResolvedAddress {
    pub fn new(ticker: &str, address: &str, now: DateTime<Utc>) -> ResolverResult<Self> {
        Ok(Self {
            version: VERSION,
            ticker: ticker.to_string(),
            address: address.to_string(),
            expires: now + Duration::seconds(RESPONSE_VALIDITY_SECONDS),
            nonce: new_nonce()?,
        })
    }
}

/// A fresh 128-bit nonce, base64url without padding. Never reused: the nonce
/// is generated per response and is not part of any cached state.
pub fn new_nonce() -> ResolverResult<String> {
    let mut buf = [0u8; 16];
    rand::rngs::OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| ResolverError::Signing(format!("nonce generation failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

#[derive(Serialize)]
struct ProtectedHeader<'a> {
    alg: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

/// Sign a payload as a compact JWS with EdDSA.
pub fn sign_compact(
    payload: &ResolvedAddress,
    key: &SigningKey,
    kid: Option<&str>,
) -> ResolverResult<String> {
    let header = serde_json::to_vec(&ProtectedHeader { alg: "EdDSA", kid })
        .map_err(|e| ResolverError::Signing(format!("encode header: {e}")))?;
    let body = serde_json::to_vec(payload)
        .map_err(|e| ResolverError::Signing(format!("encode payload: {e}")))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(body)
    );
    let signature = key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Client-side verification failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    #[error("invalid JWS format")]
    Format,
    #[error("signature verification failed")]
    Signature,
    #[error("missing address in JWS payload")]
    MissingAddress,
    #[error("missing expires in JWS payload")]
    MissingExpires,
    #[error("invalid expires in JWS payload")]
    InvalidExpires,
    #[error("resolved address has expired")]
    Expired,
}

/// A payload that passed signature and expiry verification.
#[derive(Debug, Clone)]
pub struct VerifiedAddress {
    pub ticker: String,
    pub address: String,
    pub expires: DateTime<Utc>,
    pub nonce: String,
}

// Lenient view of the payload used during verification so missing fields
// surface as typed errors rather than decode failures.
#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    expires: Option<String>,
    #[serde(default, alias = "string")]
    nonce: String,
}

/// Verify a compact JWS against a domain public key and enforce expiry.
pub fn verify_compact(
    jws: &str,
    key: &VerifyingKey,
    now: DateTime<Utc>,
) -> Result<VerifiedAddress, VerifyError> {
    let parts: Vec<&str> = jws.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(VerifyError::Format);
    }

    let signing_input = format!("{}.{}", parts[0], parts[1]);
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|_| VerifyError::Format)?;
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| VerifyError::Format)?;

    key.verify_strict(signing_input.as_bytes(), &signature)
        .map_err(|_| VerifyError::Signature)?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| VerifyError::Format)?;
    let payload: RawPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| VerifyError::Format)?;

    if payload.address.is_empty() {
        return Err(VerifyError::MissingAddress);
    }
    let expires = payload.expires.ok_or(VerifyError::MissingExpires)?;
    let expires = DateTime::parse_from_rfc3339(&expires)
        .map_err(|_| VerifyError::InvalidExpires)?
        .with_timezone(&Utc);
    if expires <= now {
        return Err(VerifyError::Expired);
    }

    Ok(VerifiedAddress {
        ticker: payload.ticker,
        address: payload.address,
        expires,
        nonce: payload.nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    fn test_keys() -> (SigningKey, VerifyingKey) {
        let (public, private) = generate_keypair();
        (
            private.signing_key().unwrap(),
            public.verifying_key().unwrap(),
        )
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let (signing, verifying) = test_keys();
        let now = Utc::now();
        let payload = ResolvedAddress::new("xmr", "addr-root", now).unwrap();

        let jws = sign_compact(&payload, &signing, Some("127.0.0.1")).unwrap();
        let verified = verify_compact(&jws, &verifying, now).unwrap();

        assert_eq!(verified.ticker, "xmr");
        assert_eq!(verified.address, "addr-root");
        assert_eq!(verified.nonce, payload.nonce);
        assert!(verified.expires > now);
    }

    #[test]
    fn test_tampering_any_segment_fails() {
        let (signing, verifying) = test_keys();
        let now = Utc::now();
        let payload = ResolvedAddress::new("xmr", "addr-root", now).unwrap();
        let jws = sign_compact(&payload, &signing, None).unwrap();

        let boundaries: Vec<usize> = jws
            .char_indices()
            .filter(|(_, c)| *c == '.')
            .map(|(i, _)| i)
            .collect();
        assert_eq!(boundaries.len(), 2);

        // Flip one character in each of the three segments.
        for idx in [0, boundaries[0] + 1, boundaries[1] + 1] {
            let mut bytes = jws.clone().into_bytes();
            bytes[idx] = if bytes[idx] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(
                verify_compact(&mutated, &verifying, now).is_err(),
                "mutation at {idx} was accepted"
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let (signing, _) = test_keys();
        let (_, other_verifying) = test_keys();
        let now = Utc::now();
        let payload = ResolvedAddress::new("xmr", "addr-root", now).unwrap();
        let jws = sign_compact(&payload, &signing, None).unwrap();

        assert_eq!(
            verify_compact(&jws, &other_verifying, now).unwrap_err(),
            VerifyError::Signature
        );
    }

    #[test]
    fn test_expired_payload_rejected() {
        let (signing, verifying) = test_keys();
        let issued = Utc::now() - Duration::seconds(120);
        let payload = ResolvedAddress::new("xmr", "addr-root", issued).unwrap();
        let jws = sign_compact(&payload, &signing, None).unwrap();

        assert_eq!(
            verify_compact(&jws, &verifying, Utc::now()).unwrap_err(),
            VerifyError::Expired
        );
    }

    #[test]
    fn test_malformed_jws_rejected() {
        let (_, verifying) = test_keys();
        let now = Utc::now();
        assert_eq!(
            verify_compact("only.two", &verifying, now).unwrap_err(),
            VerifyError::Format
        );
        assert_eq!(
            verify_compact("a.b.!!!", &verifying, now).unwrap_err(),
            VerifyError::Format
        );
    }

    #[test]
    fn test_legacy_nonce_key_accepted() {
        let raw = r#"{"version":0,"ticker":"xmr","address":"a","expires":"2030-01-01T00:00:00Z","string":"legacy-nonce"}"#;
        let payload: ResolvedAddress = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.nonce, "legacy-nonce");

        // Output always uses the current key.
        let out = serde_json::to_string(&payload).unwrap();
        assert!(out.contains("\"nonce\""));
        assert!(!out.contains("\"string\""));
    }

    #[test]
    fn test_nonce_is_fresh() {
        let a = new_nonce().unwrap();
        let b = new_nonce().unwrap();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), 16);
    }

    #[test]
    fn test_missing_address_reported() {
        let (signing, verifying) = test_keys();
        let now = Utc::now();
        let mut payload = ResolvedAddress::new("xmr", "addr", now).unwrap();
        payload.address = String::new();
        let jws = sign_compact(&payload, &signing, None).unwrap();
        assert_eq!(
            verify_compact(&jws, &verifying, now).unwrap_err(),
            VerifyError::MissingAddress
        );
    }
}
