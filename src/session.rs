// src/session.rs

use crate::error::RpError;
use crate::exchange::TokenResponse;
use crate::validator::VerifiedClaims;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

/// Scope granting REST API access.
pub const SCOPE_API: &str = "api";
/// Scope granting access to the web UI via frontdoor.
pub const SCOPE_WEB: &str = "web";

/// The set of scopes granted with the tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Splits a space-delimited scope string. Repeated and surrounding
    /// whitespace is ignored; an empty string yields an empty set.
    pub fn parse(scope: &str) -> Self {
        Self(scope.split_whitespace().map(str::to_string).collect())
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Whether the `api` feature gate is open.
    pub fn allows_api(&self) -> bool {
        self.contains(SCOPE_API)
    }

    /// Whether the `web` feature gate is open.
    pub fn allows_web(&self) -> bool {
        self.contains(SCOPE_WEB)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'a> FromIterator<&'a str> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

/// Everything known about an authenticated user after a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub claims: VerifiedClaims,
    pub tokens: TokenResponse,
    pub scopes: ScopeSet,
    /// Unix seconds at which the record was built.
    pub created_at: u64,
}

impl SessionRecord {
    pub(crate) fn new(claims: VerifiedClaims, tokens: TokenResponse) -> Self {
        let scopes = ScopeSet::parse(&tokens.scope);
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self { claims, tokens, scopes, created_at }
    }
}

/// Storage for one user's session, e.g. a cookie-backed server session.
///
/// A [`SessionRecord`] serializes but does not deserialize: its claims can
/// only come out of a successful verification. A store that keeps records
/// outside the process should persist `record.tokens` and rebuild the record
/// on `load` with [`crate::authenticator::Authenticator::restore_session`],
/// which verifies the stored identity token again.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, record: SessionRecord) -> Result<(), RpError>;
    async fn load(&self) -> Result<Option<SessionRecord>, RpError>;
    async fn destroy(&self) -> Result<(), RpError>;
}

/// An in-process [`SessionStore`] holding a single session.
///
/// With a max age, a record older than that is dropped on the next `load`.
#[derive(Default)]
pub struct MemorySessionStore {
    max_age: Option<Duration>,
    slot: Mutex<Option<(SessionRecord, Instant)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            max_age: Some(max_age),
            slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, record: SessionRecord) -> Result<(), RpError> {
        *self.slot.lock().await = Some((record, Instant::now()));
        Ok(())
    }

    async fn load(&self) -> Result<Option<SessionRecord>, RpError> {
        let mut slot = self.slot.lock().await;
        let expired = match (self.max_age, slot.as_ref()) {
            (Some(max_age), Some((_, saved_at))) => saved_at.elapsed() >= max_age,
            _ => false,
        };
        if expired {
            debug!("Session expired after {:?}", self.max_age);
            *slot = None;
        }
        Ok(slot.as_ref().map(|(record, _)| record.clone()))
    }

    async fn destroy(&self) -> Result<(), RpError> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_string_is_split_on_whitespace() {
        let scopes = ScopeSet::parse("api web");
        assert_eq!(scopes, ["api", "web"].into_iter().collect::<ScopeSet>());
        assert!(scopes.allows_api());
        assert!(scopes.allows_web());

        let scopes = ScopeSet::parse("  refresh_token\tapi  openid api ");
        assert_eq!(scopes.len(), 3);
        assert!(scopes.allows_api());
        assert!(!scopes.allows_web());
    }

    #[test]
    fn empty_scope_opens_no_gates() {
        let scopes = ScopeSet::parse("");
        assert!(scopes.is_empty());
        assert!(!scopes.allows_api());
        assert!(!scopes.allows_web());
    }

    #[test]
    fn scope_set_serializes_as_a_sorted_list() {
        let scopes = ScopeSet::parse("web api");
        assert_eq!(serde_json::to_value(&scopes).unwrap(), serde_json::json!(["api", "web"]));
    }
}
