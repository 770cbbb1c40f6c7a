// src/exchange.rs

use crate::config::Config;
use crate::error::RpError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// The provider's answer to a successful authorization-code exchange.
///
/// Deserializing applies the same required-field checks as the exchange, so
/// a stored response can be read back and passed to
/// [`crate::authenticator::Authenticator::restore_session`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTokenResponse")]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    /// Space-delimited granted scopes.
    pub scope: String,
    /// The base URL of the user's org for REST calls.
    pub instance_url: String,
    pub token_type: String,
    /// The identity URL of the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("id_token", &"<redacted>")
            .field("scope", &self.scope)
            .field("instance_url", &self.instance_url)
            .field("token_type", &self.token_type)
            .field("id", &self.id)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

// Everything optional so a missing field is reported by name rather than as
// a generic serde error.
#[derive(Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    id_token: Option<String>,
    scope: Option<String>,
    instance_url: Option<String>,
    token_type: Option<String>,
    id: Option<String>,
    issued_at: Option<String>,
    signature: Option<String>,
}

impl TryFrom<RawTokenResponse> for TokenResponse {
    type Error = RpError;

    fn try_from(raw: RawTokenResponse) -> Result<Self, Self::Error> {
        fn required(value: Option<String>, field: &str) -> Result<String, RpError> {
            value.ok_or_else(|| RpError::MalformedResponse(format!("missing required field '{field}'")))
        }

        Ok(TokenResponse {
            access_token: required(raw.access_token, "access_token")?,
            id_token: required(raw.id_token, "id_token")?,
            scope: required(raw.scope, "scope")?,
            instance_url: required(raw.instance_url, "instance_url")?,
            token_type: raw.token_type.unwrap_or_else(|| "Bearer".to_string()),
            id: raw.id,
            issued_at: raw.issued_at,
            signature: raw.signature,
        })
    }
}

/// Exchanges authorization codes at the provider's token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    token_endpoint: Url,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TokenClient {
    /// Creates a `TokenClient` with its own timeout-bounded HTTP client.
    pub fn new(config: &Config) -> Result<Self, RpError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| RpError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;
        Self::with_http_client(http_client, config)
    }

    /// Creates a `TokenClient` around an existing HTTP client.
    pub fn with_http_client(http_client: reqwest::Client, config: &Config) -> Result<Self, RpError> {
        Ok(Self {
            inner: Arc::new(Inner {
                http_client,
                token_endpoint: config.token_endpoint()?,
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                redirect_uri: config.redirect_uri.to_string(),
            }),
        })
    }

    /// Trades a single-use authorization code for tokens.
    ///
    /// # Errors
    ///
    /// * `Exchange` if the request fails or the provider answers non-2xx
    ///   (the provider's body is kept for logs).
    /// * `MalformedResponse` if the body is not JSON or lacks a required field.
    /// * `UpstreamTimeout` if the configured timeout elapses.
    #[instrument(skip(self, code), fields(token_endpoint = %self.inner.token_endpoint), err)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, RpError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.as_str()),
            ("redirect_uri", self.inner.redirect_uri.as_str()),
            ("code", code),
        ];

        let response = self
            .inner
            .http_client
            .post(self.inner.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form[..])
            .send()
            .await
            .map_err(RpError::exchange_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(RpError::exchange_transport)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Token endpoint rejected the authorization code.");
            return Err(RpError::Exchange {
                status: Some(status.as_u16()),
                body,
            });
        }

        let raw: RawTokenResponse = serde_json::from_str(&body)
            .map_err(|e| RpError::MalformedResponse(format!("token response is not valid JSON: {e}")))?;
        let tokens = TokenResponse::try_from(raw)?;

        debug!(instance_url = %tokens.instance_url, scope = %tokens.scope, "Received token response.");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Result<TokenResponse, RpError> {
        let raw: RawTokenResponse = serde_json::from_str(body).unwrap();
        TokenResponse::try_from(raw)
    }

    #[test]
    fn missing_fields_are_named() {
        let result = parse(r#"{"access_token":"a","scope":"api","instance_url":"https://x"}"#);
        assert!(matches!(result, Err(RpError::MalformedResponse(m)) if m.contains("id_token")));

        let result = parse(r#"{"access_token":"a","id_token":"i","instance_url":"https://x"}"#);
        assert!(matches!(result, Err(RpError::MalformedResponse(m)) if m.contains("scope")));
    }

    #[test]
    fn token_type_defaults_to_bearer() {
        let tokens = parse(r#"{"access_token":"a","id_token":"i","scope":"","instance_url":"https://x"}"#).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.scope, "");
    }

    #[test]
    fn debug_output_hides_tokens() {
        let tokens = parse(r#"{"access_token":"00Dxx!secret","id_token":"eyJ.x.y","scope":"api","instance_url":"https://x"}"#).unwrap();
        let printed = format!("{tokens:?}");
        assert!(!printed.contains("00Dxx!secret"));
        assert!(!printed.contains("eyJ.x.y"));
    }

    #[test]
    fn stored_response_reads_back_with_the_same_checks() {
        let tokens = parse(r#"{"access_token":"a","id_token":"i","scope":"api web","instance_url":"https://x","id":"https://x/id/1"}"#).unwrap();
        let stored = serde_json::to_string(&tokens).unwrap();
        assert_eq!(serde_json::from_str::<TokenResponse>(&stored).unwrap(), tokens);

        let err = serde_json::from_str::<TokenResponse>(r#"{"access_token":"a","scope":"api","instance_url":"https://x"}"#).unwrap_err();
        assert!(err.to_string().contains("id_token"));
    }
}
