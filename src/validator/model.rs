// src/validator/model.rs

use crate::error::RpError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    pub kid: String,
    pub kty: String,
    #[serde(rename = "use")]
    pub use_purpose: Option<String>,
    pub alg: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

/// The base64url-encoded public components of an RSA signing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub n: String,
    pub e: String,
}

/// A fetched key set indexed by key id.
///
/// Only RSA keys are indexed; identity tokens are RS256-only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeySet {
    keys: HashMap<String, RsaPublicKey>,
    max_age: Option<Duration>,
}

impl KeySet {
    /// Indexes a wire JWKS by `kid`.
    ///
    /// Keys of other types are skipped. An RSA key without `n` or `e` makes
    /// the whole set invalid.
    pub fn from_jwks(jwks: JsonWebKeySet) -> Result<Self, RpError> {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                tracing::debug!(kid = %jwk.kid, kty = %jwk.kty, "Skipping non-RSA key.");
                continue;
            }
            let n = jwk.n.ok_or_else(|| RpError::KeyFetch(format!("RSA key '{}' missing 'n' component", jwk.kid)))?;
            let e = jwk.e.ok_or_else(|| RpError::KeyFetch(format!("RSA key '{}' missing 'e' component", jwk.kid)))?;
            keys.insert(jwk.kid, RsaPublicKey { n, e });
        }
        Ok(Self { keys, max_age: None })
    }

    /// Attaches the freshness hint the provider sent with this set.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Looks up the key for `kid`. There is no fallback to any other key.
    pub fn find(&self, kid: &str) -> Option<&RsaPublicKey> {
        self.keys.get(kid)
    }

    /// The `Cache-Control: max-age` the provider sent, if any.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key ids in this set, in no particular order.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwks(value: serde_json::Value) -> JsonWebKeySet {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn indexes_rsa_keys_and_skips_others() {
        let set = KeySet::from_jwks(jwks(serde_json::json!({
            "keys": [
                { "kty": "RSA", "kid": "230", "alg": "RS256", "use": "sig", "n": "AQAB", "e": "AQAB" },
                { "kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "abc", "y": "def" }
            ]
        })))
        .unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.find("230").is_some());
        assert!(set.find("ec-1").is_none());
        assert!(set.find("231").is_none());
    }

    #[test]
    fn rsa_key_without_modulus_is_rejected() {
        let result = KeySet::from_jwks(jwks(serde_json::json!({
            "keys": [{ "kty": "RSA", "kid": "230", "e": "AQAB" }]
        })));
        assert!(matches!(result, Err(RpError::KeyFetch(msg)) if msg.contains("'n'")));
    }
}
