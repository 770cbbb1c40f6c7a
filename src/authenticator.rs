// src/authenticator.rs

use crate::config::Config;
use crate::error::RpError;
use crate::exchange::{TokenClient, TokenResponse};
use crate::session::{SessionRecord, SessionStore};
use crate::validator::client::{JwksClient, KeySource};
use crate::validator::Verifier;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Turns an authorization code into a verified [`SessionRecord`].
///
/// This is what an OAuth callback handler calls. It is created once from a
/// `Config` and shared across requests; no state is shared between logins.
#[derive(Clone)]
pub struct Authenticator {
    config: Arc<Config>,
    token_client: TokenClient,
    key_source: Arc<dyn KeySource>,
    verifier: Verifier,
}

impl Authenticator {
    /// Creates an `Authenticator` that fetches the provider's keys on every login.
    pub fn new(config: Config) -> Result<Self, RpError> {
        let key_source = JwksClient::new(&config)?;
        Self::with_key_source(config, Arc::new(key_source))
    }

    /// Creates an `Authenticator` with a custom key source, e.g. a
    /// [`crate::validator::client::CachedKeySource`].
    pub fn with_key_source(config: Config, key_source: Arc<dyn KeySource>) -> Result<Self, RpError> {
        let token_client = TokenClient::new(&config)?;
        let verifier = Verifier::new(config.validation.leeway);
        Ok(Self {
            config: Arc::new(config),
            token_client,
            key_source,
            verifier,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Exchanges `code`, verifies the identity token and assembles the session.
    ///
    /// The key set is fetched while the code exchange is in flight. Errors
    /// are reported in pipeline order: a failed exchange wins over a failed
    /// key fetch, and no record is produced unless every step succeeds. A
    /// rejected exchange does not wait for the key fetch to finish.
    #[instrument(skip(self, code), err)]
    pub async fn build_session(&self, code: &str) -> Result<SessionRecord, RpError> {
        if code.trim().is_empty() {
            return Err(RpError::MissingAuthorizationCode);
        }

        let exchange = self.token_client.exchange_code(code);
        let keys = self.key_source.fetch_keys();
        tokio::pin!(exchange, keys);

        // A failed exchange returns at once and drops the pending key fetch.
        let (tokens, key_set) = tokio::select! {
            biased;
            tokens = &mut exchange => {
                let tokens = tokens?;
                (tokens, keys.await)
            }
            key_set = &mut keys => (exchange.await?, key_set),
        };
        let key_set = key_set?;

        let claims = self.verifier.verify(
            &tokens.id_token,
            &key_set,
            &self.config.client_id,
            self.config.validation.key_id_override.as_deref(),
        )?;

        let record = SessionRecord::new(claims, tokens);
        info!(
            sub = record.claims.sub().unwrap_or_default(),
            scopes = ?record.scopes,
            "Login verified."
        );
        Ok(record)
    }

    /// Rebuilds a session from tokens kept outside this process.
    ///
    /// The stored `id_token` is verified again against the provider's current
    /// key set, so nothing read back from storage is trusted as-is. Fails with
    /// `TokenVerification` once the token has expired.
    #[instrument(skip(self, tokens), err)]
    pub async fn restore_session(&self, tokens: TokenResponse) -> Result<SessionRecord, RpError> {
        let key_set = self.key_source.fetch_keys().await?;
        let claims = self.verifier.verify(
            &tokens.id_token,
            &key_set,
            &self.config.client_id,
            self.config.validation.key_id_override.as_deref(),
        )?;
        let record = SessionRecord::new(claims, tokens);
        debug!(sub = record.claims.sub().unwrap_or_default(), "Session restored.");
        Ok(record)
    }

    /// Builds the session for `code` and saves it in `store`.
    #[instrument(skip(self, code, store), err)]
    pub async fn login(&self, code: &str, store: &dyn SessionStore) -> Result<SessionRecord, RpError> {
        let record = self.build_session(code).await?;
        store.save(record.clone()).await?;
        Ok(record)
    }

    /// Ends the session held in `store`.
    pub async fn logout(&self, store: &dyn SessionStore) -> Result<(), RpError> {
        store.destroy().await
    }
}
