// src/validator.rs

pub mod client;
pub mod model;

use crate::error::VerificationFailure;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey};
use model::KeySet;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// The only header `typ` accepted.
const EXPECTED_TYP: &str = "JWT";
/// The only header `alg` accepted.
const EXPECTED_ALG: &str = "RS256";

/// The identity token header, as sent. Fields are kept as strings so that
/// values the JWT library has no variant for (`none`) still parse and get a
/// precise rejection.
#[derive(Debug, Deserialize)]
struct IdentityTokenHeader {
    alg: Option<String>,
    typ: Option<String>,
    kid: Option<String>,
}

/// The claims of an identity token that passed every check.
///
/// There is no public constructor; the only way to obtain one is
/// [`Verifier::verify`]. Serializes as the original, unmodified payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    raw: Map<String, Value>,
}

impl VerifiedClaims {
    /// The subject. For Salesforce this is the identity URL of the user.
    pub fn sub(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    pub fn iss(&self) -> Option<&str> {
        self.str_claim("iss")
    }

    /// The audience. Always the configured client id.
    pub fn aud(&self) -> Option<&str> {
        match self.raw.get("aud")? {
            Value::String(s) => Some(s),
            Value::Array(values) => values.first()?.as_str(),
            _ => None,
        }
    }

    pub fn exp(&self) -> Option<u64> {
        self.raw.get("exp")?.as_u64()
    }

    pub fn iat(&self) -> Option<u64> {
        self.raw.get("iat")?.as_u64()
    }

    pub fn nbf(&self) -> Option<u64> {
        self.raw.get("nbf")?.as_u64()
    }

    /// The user's display name.
    pub fn name(&self) -> Option<&str> {
        self.str_claim("name")
    }

    /// Any other claim by name.
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.raw.get(claim)
    }

    /// The complete payload as decoded from the token.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.raw
    }

    fn str_claim(&self, claim: &str) -> Option<&str> {
        self.raw.get(claim)?.as_str()
    }
}

impl Serialize for VerifiedClaims {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// The identity token verifier.
///
/// Holds only the clock skew tolerance; keys and the expected audience are
/// passed per call so that nothing is shared between login attempts.
#[derive(Debug, Clone)]
pub struct Verifier {
    leeway: Duration,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl Verifier {
    pub fn new(leeway: Duration) -> Self {
        Self { leeway }
    }

    /// Verifies a compact identity token against `key_set`.
    ///
    /// Checks, in order: shape, header (`typ: JWT`, `alg: RS256`), key id
    /// (override first, then header), key lookup, RS256 signature, `exp`/`nbf`,
    /// and finally that `aud` is exactly `expected_audience`. The first
    /// failing check determines the error.
    pub fn verify(
        &self,
        token: &str,
        key_set: &KeySet,
        expected_audience: &str,
        key_id_override: Option<&str>,
    ) -> Result<VerifiedClaims, VerificationFailure> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.verify_at(token, key_set, expected_audience, key_id_override, now)
    }

    /// Like [`Verifier::verify`], evaluating temporal claims at `now` (unix seconds).
    pub fn verify_at(
        &self,
        token: &str,
        key_set: &KeySet,
        expected_audience: &str,
        key_id_override: Option<&str>,
        now: u64,
    ) -> Result<VerifiedClaims, VerificationFailure> {
        let (header_segment, payload_segment, signature_segment) = split_token(token)?;

        let header: IdentityTokenHeader = decode_segment(header_segment, "header")?;
        check_header(&header)?;

        let kid = effective_kid(&header, key_id_override)?;
        let key = key_set.find(kid).ok_or_else(|| {
            warn!(kid = %kid, "Identity token signed with a key that is not in the current key set.");
            VerificationFailure::KeyNotFound { kid: kid.to_string() }
        })?;

        let decoding_key = DecodingKey::from_rsa_components(&key.n, &key.e).map_err(|e| {
            warn!(kid = %kid, "Unusable RSA key material: {}", e);
            VerificationFailure::InvalidSignature
        })?;
        let signing_input = &token[..header_segment.len() + 1 + payload_segment.len()];
        check_signature(signature_segment, signing_input, &decoding_key)?;

        let claims: Map<String, Value> = decode_segment(payload_segment, "payload")?;
        check_temporal_claims(&claims, now, self.leeway.as_secs())?;
        check_audience(&claims, expected_audience)?;

        debug!(kid = %kid, "Identity token verified.");
        Ok(VerifiedClaims { raw: claims })
    }
}

fn split_token(token: &str) -> Result<(&str, &str, &str), VerificationFailure> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => Err(VerificationFailure::Malformed("expected three dot-separated segments".to_string())),
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> Result<T, VerificationFailure> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| VerificationFailure::Malformed(format!("{what} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| VerificationFailure::Malformed(format!("{what} is not valid JSON: {e}")))
}

fn check_header(header: &IdentityTokenHeader) -> Result<(), VerificationFailure> {
    if header.typ.as_deref() == Some(EXPECTED_TYP) && header.alg.as_deref() == Some(EXPECTED_ALG) {
        return Ok(());
    }
    Err(VerificationFailure::UnsupportedAlgorithm {
        alg: header.alg.clone(),
        typ: header.typ.clone(),
    })
}

fn effective_kid<'a>(header: &'a IdentityTokenHeader, key_id_override: Option<&'a str>) -> Result<&'a str, VerificationFailure> {
    key_id_override
        .or(header.kid.as_deref())
        .filter(|kid| !kid.is_empty())
        .ok_or(VerificationFailure::MissingKeyId)
}

fn check_signature(signature: &str, signing_input: &str, key: &DecodingKey) -> Result<(), VerificationFailure> {
    match jsonwebtoken::crypto::verify(signature, signing_input.as_bytes(), key, Algorithm::RS256) {
        Ok(true) => Ok(()),
        Ok(false) => Err(VerificationFailure::InvalidSignature),
        Err(e) => {
            debug!("Signature could not be checked: {}", e);
            Err(VerificationFailure::InvalidSignature)
        }
    }
}

fn check_temporal_claims(claims: &Map<String, Value>, now: u64, leeway: u64) -> Result<(), VerificationFailure> {
    if let Some(exp) = numeric_claim(claims, "exp")? {
        if exp.saturating_add(leeway) <= now {
            return Err(VerificationFailure::Expired { exp });
        }
    }
    if let Some(nbf) = numeric_claim(claims, "nbf")? {
        if nbf > now.saturating_add(leeway) {
            return Err(VerificationFailure::NotYetValid { nbf });
        }
    }
    Ok(())
}

// A present but non-numeric time claim is malformed, not absent.
fn numeric_claim(claims: &Map<String, Value>, name: &str) -> Result<Option<u64>, VerificationFailure> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| VerificationFailure::Malformed(format!("'{name}' is not a NumericDate"))),
    }
}

fn check_audience(claims: &Map<String, Value>, expected: &str) -> Result<(), VerificationFailure> {
    let matches = match claims.get("aud") {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(values)) => values.len() == 1 && values[0].as_str() == Some(expected),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        warn!("Identity token audience does not match the configured client id.");
        Err(VerificationFailure::AudienceMismatch)
    }
}
