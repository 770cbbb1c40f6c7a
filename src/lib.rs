// src/lib.rs

pub mod authenticator;
pub mod config;
pub mod error;
pub mod exchange;
pub mod session;
pub mod validator;

/// The public prelude for the `sf-oidc-rp` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::authenticator::Authenticator;
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::{RpError, VerificationFailure};
    pub use crate::exchange::{TokenClient, TokenResponse};
    pub use crate::session::{MemorySessionStore, ScopeSet, SessionRecord, SessionStore};
    pub use crate::validator::client::{CachedKeySource, JwksClient, KeySource};
    pub use crate::validator::model::KeySet;
    pub use crate::validator::{VerifiedClaims, Verifier};
}
