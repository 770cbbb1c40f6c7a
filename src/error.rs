// src/error.rs

use thiserror::Error;

/// The reason an identity token was rejected.
///
/// These details are for server-side logs only. See [`RpError::public_message`]
/// for the text that may be shown to an end user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    /// The token is not three base64url segments, or its header/payload is not JSON.
    #[error("malformed identity token: {0}")]
    Malformed(String),

    /// The header did not declare `typ: JWT` and `alg: RS256`.
    #[error("unsupported token type or algorithm (typ: {typ:?}, alg: {alg:?})")]
    UnsupportedAlgorithm {
        alg: Option<String>,
        typ: Option<String>,
    },

    /// Neither the configuration nor the token header supplied a key id.
    #[error("the token header has no 'kid' and no key id override is configured")]
    MissingKeyId,

    /// The effective key id is not present in the fetched key set.
    #[error("key not found for kid: {kid}")]
    KeyNotFound { kid: String },

    /// The RS256 signature did not verify under the selected key.
    #[error("signature verification failed")]
    InvalidSignature,

    /// The `exp` claim is in the past.
    #[error("token expired at {exp}")]
    Expired { exp: u64 },

    /// The `nbf` claim is in the future.
    #[error("token not valid before {nbf}")]
    NotYetValid { nbf: u64 },

    /// The `aud` claim does not name this client.
    #[error("audience mismatch")]
    AudienceMismatch,
}

/// The primary error type for the `sf-oidc-rp` crate.
#[derive(Debug, Clone, Error)]
pub enum RpError {
    /// The OAuth callback was hit without an authorization code.
    #[error("expected an authorization code")]
    MissingAuthorizationCode,

    /// The code exchange failed at the transport level or the provider refused it.
    /// `status` is `None` when no HTTP response was received.
    #[error("token exchange failed (status: {status:?}): {body}")]
    Exchange { status: Option<u16>, body: String },

    /// The token endpoint answered 2xx but the body is not a usable token response.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// The provider's key set could not be fetched or parsed.
    #[error("failed to fetch JWKS: {0}")]
    KeyFetch(String),

    /// The identity token was rejected.
    #[error("identity token verification failed: {0}")]
    TokenVerification(#[from] VerificationFailure),

    /// An outbound call to the provider exceeded the configured timeout.
    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The session storage collaborator failed.
    #[error("session store error: {0}")]
    SessionStore(String),
}

impl RpError {
    /// The HTTP status the callback handler should answer with.
    ///
    /// Expected-input failures map to 4xx, provider and upstream failures to 5xx.
    pub fn status_code(&self) -> u16 {
        match self {
            RpError::MissingAuthorizationCode => 417,
            RpError::TokenVerification(_) => 401,
            RpError::Exchange { status: Some(s), .. } if (400..500).contains(s) => 400,
            RpError::Exchange { .. } | RpError::MalformedResponse(_) | RpError::KeyFetch(_) => 502,
            RpError::UpstreamTimeout(_) => 504,
            RpError::MissingConfiguration(_)
            | RpError::InvalidConfiguration(_)
            | RpError::InvalidUrl(_)
            | RpError::SessionStore(_) => 500,
        }
    }

    /// A fixed, user-safe message for this error.
    ///
    /// Every verification failure shares one message so that nothing about
    /// signatures or audiences leaks to the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            RpError::MissingAuthorizationCode => "Expected authorization code",
            RpError::TokenVerification(_) => "Authentication failed",
            RpError::Exchange { status: Some(s), .. } if (400..500).contains(s) => {
                "The authorization code was rejected by the identity provider"
            }
            RpError::Exchange { .. } | RpError::MalformedResponse(_) | RpError::KeyFetch(_) => {
                "The identity provider returned an unexpected response"
            }
            RpError::UpstreamTimeout(_) => "The identity provider did not respond in time",
            _ => "Internal server error",
        }
    }

    /// Maps a `reqwest` failure on the token endpoint.
    pub(crate) fn exchange_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpError::UpstreamTimeout(format!("token exchange: {err}"))
        } else {
            RpError::Exchange { status: None, body: err.to_string() }
        }
    }

    /// Maps a `reqwest` failure on the key set endpoint.
    pub(crate) fn key_fetch_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpError::UpstreamTimeout(format!("JWKS fetch: {err}"))
        } else {
            RpError::KeyFetch(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failures_share_a_generic_public_message() {
        let sig = RpError::from(VerificationFailure::InvalidSignature);
        let aud = RpError::from(VerificationFailure::AudienceMismatch);
        assert_eq!(sig.public_message(), aud.public_message());
        assert!(!sig.public_message().to_lowercase().contains("signature"));
        assert!(!aud.public_message().to_lowercase().contains("audience"));
        assert_eq!(sig.status_code(), 401);
    }

    #[test]
    fn status_codes_split_client_and_upstream_failures() {
        assert_eq!(RpError::MissingAuthorizationCode.status_code(), 417);
        let rejected = RpError::Exchange { status: Some(400), body: "{\"error\":\"invalid_grant\"}".into() };
        assert_eq!(rejected.status_code(), 400);
        let down = RpError::Exchange { status: Some(503), body: String::new() };
        assert_eq!(down.status_code(), 502);
        assert_eq!(RpError::KeyFetch("HTTP 500".into()).status_code(), 502);
        assert_eq!(RpError::UpstreamTimeout("jwks".into()).status_code(), 504);
    }
}
