//! Ed25519 domain keys: YAML serialization, JWK export and DNS publication.

use crate::error::{ResolverError, ResolverResult};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Raw Ed25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Raw Ed25519 keypair length (secret seed followed by public key).
pub const PRIVATE_KEY_LEN: usize = 64;

/// A domain's public key, stored in YAML as std base64.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PublicKey(Vec<u8>);

/// A domain's private key (64-byte Ed25519 keypair), stored in YAML as std base64.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PrivateKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn verifying_key(&self) -> ResolverResult<VerifyingKey> {
        let bytes: [u8; PUBLIC_KEY_LEN] = self
            .0
            .as_slice()
            .try_into()
            .map_err(|_| ResolverError::ConfigInvalid("public key must be 32 bytes".to_string()))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ResolverError::ConfigInvalid(format!("invalid public key: {e}")))
    }
}

impl PrivateKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn signing_key(&self) -> ResolverResult<SigningKey> {
        let bytes: [u8; PRIVATE_KEY_LEN] = self.0.as_slice().try_into().map_err(|_| {
            ResolverError::ConfigInvalid("private key must be 64 bytes".to_string())
        })?;
        SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| ResolverError::ConfigInvalid(format!("invalid private key: {e}")))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "PublicKey(empty)");
        }
        let b64 = STANDARD.encode(&self.0);
        write!(f, "PublicKey({}...)", &b64[..b64.len().min(8)])
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_key(&self.0, serializer)
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_key(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(deserialize_key(deserializer)?))
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(deserialize_key(deserializer)?))
    }
}

fn serialize_key<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    if bytes.is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }
}

fn deserialize_key<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(Vec::new()),
        Some(s) if s.is_empty() => Ok(Vec::new()),
        Some(s) => STANDARD
            .decode(s.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid base64 key: {e}"))),
    }
}

/// Generate a fresh Ed25519 keypair.
pub fn generate_keypair() -> (PublicKey, PrivateKey) {
    let signing = SigningKey::generate(&mut OsRng);
    let public = PublicKey(signing.verifying_key().to_bytes().to_vec());
    let private = PrivateKey(signing.to_keypair_bytes().to_vec());
    (public, private)
}

/// JSON Web Key carrying an Ed25519 public key, `kid` set to the domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Jwk {
    pub fn from_public_key(key: &PublicKey, kid: &str) -> Self {
        Self {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: URL_SAFE_NO_PAD.encode(key.as_bytes()),
            kid: Some(kid.to_string()),
        }
    }

    /// Decode the raw public key bytes carried in `x`.
    pub fn public_key_bytes(&self) -> ResolverResult<Vec<u8>> {
        if self.kty != "OKP" || self.crv != "Ed25519" {
            return Err(ResolverError::ConfigInvalid(format!(
                "unsupported key type {}/{}",
                self.kty, self.crv
            )));
        }
        URL_SAFE_NO_PAD
            .decode(self.x.as_bytes())
            .map_err(|e| ResolverError::ConfigInvalid(format!("invalid JWK x value: {e}")))
    }

    pub fn verifying_key(&self) -> ResolverResult<VerifyingKey> {
        PublicKey(self.public_key_bytes()?).verifying_key()
    }
}

/// TXT record value publishing a domain's public key.
pub fn dns_txt_value(key: &PublicKey) -> String {
    format!("pubkey={}", STANDARD.encode(key.as_bytes()))
}

/// Ready-to-copy DNS TXT record line for a domain.
pub fn dns_txt_record(domain: &str, key: &PublicKey) -> String {
    format!("_cryptalias.{} IN TXT {:?}", domain, dns_txt_value(key))
}

/// Tolerant base64 decode used for externally published keys (DNS records
/// pasted from various providers use different alphabets and padding).
pub fn decode_base64_key(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() {
        return None;
    }
    STANDARD
        .decode(s)
        .or_else(|_| STANDARD_NO_PAD.decode(s))
        .or_else(|_| URL_SAFE.decode(s))
        .or_else(|_| URL_SAFE_NO_PAD.decode(s))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair_lengths() {
        let (public, private) = generate_keypair();
        assert_eq!(public.len(), PUBLIC_KEY_LEN);
        assert_eq!(private.len(), PRIVATE_KEY_LEN);
        // The trailing half of the keypair bytes is the public key.
        assert_eq!(&private.as_bytes()[32..], public.as_bytes());
    }

    #[test]
    fn test_key_yaml_roundtrip() {
        let (public, private) = generate_keypair();

        let yaml = serde_yaml::to_string(&public).unwrap();
        let parsed: PublicKey = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, public);

        let yaml = serde_yaml::to_string(&private).unwrap();
        let parsed: PrivateKey = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, private);
    }

    #[test]
    fn test_empty_key_yaml() {
        let parsed: PublicKey = serde_yaml::from_str("\"\"").unwrap();
        assert!(parsed.is_empty());
        let yaml = serde_yaml::to_string(&PublicKey::default()).unwrap();
        assert_eq!(yaml.trim(), "''");
    }

    #[test]
    fn test_jwk_roundtrip() {
        let (public, _) = generate_keypair();
        let jwk = Jwk::from_public_key(&public, "example.com");
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv, "Ed25519");
        assert_eq!(jwk.kid.as_deref(), Some("example.com"));
        assert_eq!(jwk.public_key_bytes().unwrap(), public.as_bytes());
        assert!(jwk.verifying_key().is_ok());
    }

    #[test]
    fn test_jwk_rejects_foreign_key_types() {
        let jwk = Jwk {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x: "AA".to_string(),
            kid: None,
        };
        assert!(jwk.public_key_bytes().is_err());
    }

    #[test]
    fn test_dns_txt_value() {
        let key = PublicKey::from_bytes(vec![1u8; 32]);
        let value = dns_txt_value(&key);
        assert!(value.starts_with("pubkey="));
        assert_eq!(
            decode_base64_key(value.strip_prefix("pubkey=").unwrap()).unwrap(),
            key.as_bytes()
        );
    }

    #[test]
    fn test_decode_base64_key_variants() {
        let bytes = vec![0xde, 0xad, 0xbe, 0xef, 0x01];
        for encoded in [
            STANDARD.encode(&bytes),
            STANDARD_NO_PAD.encode(&bytes),
            URL_SAFE.encode(&bytes),
            URL_SAFE_NO_PAD.encode(&bytes),
        ] {
            assert_eq!(decode_base64_key(&encoded).unwrap(), bytes);
        }
        assert!(decode_base64_key("").is_none());
        assert!(decode_base64_key("!!not base64!!").is_none());
    }
}
