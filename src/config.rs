// src/config.rs

use crate::error::RpError;
use std::fmt;
use std::time::Duration;
use url::Url;

/// The Salesforce production login host, used when no provider URL is configured.
pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";

const TOKEN_PATH: &str = "services/oauth2/token";
const AUTHORIZE_PATH: &str = "services/oauth2/authorize";
const KEYS_PATH: &str = "id/keys";

/// Contains the validation settings for the identity token.
#[derive(Clone, Debug)]
pub struct ValidationDetails {
    /// The tolerance for clock skew when validating `exp` and `nbf`.
    /// Defaults to 60 seconds.
    pub leeway: Duration,
    /// Forces the key id used to select the signing key, ignoring the token's `kid`.
    /// This only picks the key; the signature is always verified.
    pub key_id_override: Option<String>,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            leeway: Duration::from_secs(60),
            key_id_override: None,
        }
    }
}

/// The immutable configuration for one client registration at one provider.
///
/// Construct it with [`ConfigBuilder`] or [`Config::from_env`] and hand it to
/// [`crate::authenticator::Authenticator`].
#[derive(Clone)]
pub struct Config {
    /// The client ID registered with the provider (the connected app's consumer key).
    /// Also the only `aud` accepted in identity tokens.
    pub client_id: String,
    /// The client secret. Never logged; redacted in `Debug` output.
    pub client_secret: String,
    /// The redirect URI registered for this client.
    pub redirect_uri: Url,
    /// The provider base URL, e.g. `https://login.salesforce.com`.
    pub login_url: Url,
    /// Upper bound for each outbound HTTP call. Defaults to 10 seconds.
    pub http_timeout: Duration,
    /// The identity token validation settings.
    pub validation: ValidationDetails,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("login_url", &self.login_url.as_str())
            .field("http_timeout", &self.http_timeout)
            .field("validation", &self.validation)
            .finish()
    }
}

impl Config {
    /// Builds a configuration from the process environment.
    ///
    /// Reads `OAUTH_CLIENT_ID`, `OAUTH_CLIENT_SECRET` and `OAUTH_REDIRECT_URI`
    /// (required), plus `SF_LOGIN_URL`, `SF_KEY_ID_OVERRIDE` and
    /// `SF_HTTP_TIMEOUT_SECS` (optional).
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is unset or a value does not parse.
    pub fn from_env() -> Result<Self, RpError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, RpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| RpError::MissingConfiguration(name.to_string()))
        };

        let mut builder = ConfigBuilder::new()
            .client_id(required("OAUTH_CLIENT_ID")?)
            .client_secret(required("OAUTH_CLIENT_SECRET")?)
            .redirect_uri(&required("OAUTH_REDIRECT_URI")?)?;

        if let Some(login_url) = lookup("SF_LOGIN_URL").filter(|v| !v.trim().is_empty()) {
            builder = builder.login_url(&login_url)?;
        }
        if let Some(kid) = lookup("SF_KEY_ID_OVERRIDE").filter(|v| !v.trim().is_empty()) {
            builder = builder.key_id_override(kid);
        }
        if let Some(secs) = lookup("SF_HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                RpError::InvalidConfiguration(format!("SF_HTTP_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            builder = builder.http_timeout(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// `{login_url}/services/oauth2/token`
    pub fn token_endpoint(&self) -> Result<Url, RpError> {
        join_path(&self.login_url, TOKEN_PATH)
    }

    /// `{login_url}/id/keys`
    pub fn keys_endpoint(&self) -> Result<Url, RpError> {
        join_path(&self.login_url, KEYS_PATH)
    }

    /// The URL an unauthenticated user is redirected to in order to start the
    /// authorization-code flow. `state` is appended verbatim when given.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url, RpError> {
        let mut url = join_path(&self.login_url, AUTHORIZE_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.redirect_uri.as_str())
                .append_pair("response_type", "code");
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }
}

// Joins relative to the base path so a login URL like `https://host/sandbox`
// keeps its prefix.
fn join_path(base: &Url, path: &str) -> Result<Url, RpError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path).map_err(|e| RpError::InvalidUrl(e.to_string()))
}

/// A builder for creating a `Config` instance.
#[derive(Default)]
pub struct ConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<Url>,
    login_url: Option<Url>,
    http_timeout: Option<Duration>,
    validation: ValidationDetails,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the client ID. This is a required field.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the client secret. This is a required field.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Sets the registered redirect URI. This is a required field.
    pub fn redirect_uri(mut self, url: &str) -> Result<Self, RpError> {
        let parsed_url = Url::parse(url).map_err(|e| RpError::InvalidUrl(e.to_string()))?;
        self.redirect_uri = Some(parsed_url);
        Ok(self)
    }

    /// Sets the provider base URL. Defaults to [`DEFAULT_LOGIN_URL`].
    pub fn login_url(mut self, url: &str) -> Result<Self, RpError> {
        let parsed_url = Url::parse(url).map_err(|e| RpError::InvalidUrl(e.to_string()))?;
        if parsed_url.cannot_be_a_base() {
            return Err(RpError::InvalidUrl(format!("login URL cannot be a base: {url}")));
        }
        self.login_url = Some(parsed_url);
        Ok(self)
    }

    /// Sets the timeout applied to each outbound HTTP call.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets the clock skew tolerance. Defaults to 60 seconds.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    /// Forces the key id used to look up the signing key.
    pub fn key_id_override(mut self, kid: impl Into<String>) -> Self {
        self.validation.key_id_override = Some(kid.into());
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field (`client_id`, `client_secret`,
    /// `redirect_uri`) is missing or the timeout is zero.
    pub fn build(self) -> Result<Config, RpError> {
        let client_id = self.client_id.ok_or(RpError::MissingConfiguration("client_id".to_string()))?;
        let client_secret = self
            .client_secret
            .ok_or(RpError::MissingConfiguration("client_secret".to_string()))?;
        let redirect_uri = self
            .redirect_uri
            .ok_or(RpError::MissingConfiguration("redirect_uri".to_string()))?;

        let login_url = match self.login_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_LOGIN_URL).map_err(|e| RpError::InvalidUrl(e.to_string()))?,
        };

        let http_timeout = self.http_timeout.unwrap_or(Duration::from_secs(10));
        if http_timeout.is_zero() {
            return Err(RpError::InvalidConfiguration("http_timeout must be greater than zero".to_string()));
        }

        Ok(Config {
            client_id,
            client_secret,
            redirect_uri,
            login_url,
            http_timeout,
            validation: self.validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> ConfigBuilder {
        ConfigBuilder::new()
            .client_id("3MVG9-consumer-key")
            .client_secret("s3cr3t")
            .redirect_uri("https://app.example.com/oauth/callback")
            .unwrap()
    }

    #[test]
    fn endpoints_are_derived_from_the_login_url() {
        let config = base().build().unwrap();
        assert_eq!(config.token_endpoint().unwrap().as_str(), "https://login.salesforce.com/services/oauth2/token");
        assert_eq!(config.keys_endpoint().unwrap().as_str(), "https://login.salesforce.com/id/keys");

        let sandbox = base().login_url("https://test.salesforce.com/custom").unwrap().build().unwrap();
        assert_eq!(sandbox.keys_endpoint().unwrap().as_str(), "https://test.salesforce.com/custom/id/keys");
    }

    #[test]
    fn authorization_url_carries_client_and_redirect() {
        let config = base().build().unwrap();
        let url = config.authorization_url(Some("xyz")).unwrap();
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/services/oauth2/authorize");
        assert_eq!(pairs["client_id"], "3MVG9-consumer-key");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/oauth/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["state"], "xyz");
    }

    #[test]
    fn build_requires_client_credentials() {
        let missing = ConfigBuilder::new()
            .client_id("id")
            .redirect_uri("https://app.example.com/cb")
            .unwrap()
            .build();
        assert!(matches!(missing, Err(RpError::MissingConfiguration(f)) if f == "client_secret"));
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = base().build().unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("s3cr3t"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn from_lookup_reads_the_environment_names() {
        let env: HashMap<&str, &str> = [
            ("OAUTH_CLIENT_ID", "cid"),
            ("OAUTH_CLIENT_SECRET", "csecret"),
            ("OAUTH_REDIRECT_URI", "http://localhost:3000/oauth/callback"),
            ("SF_LOGIN_URL", "https://mydomain.my.salesforce.com"),
            ("SF_KEY_ID_OVERRIDE", "232"),
            ("SF_HTTP_TIMEOUT_SECS", "3"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.client_id, "cid");
        assert_eq!(config.login_url.as_str(), "https://mydomain.my.salesforce.com/");
        assert_eq!(config.validation.key_id_override.as_deref(), Some("232"));
        assert_eq!(config.http_timeout, Duration::from_secs(3));

        let missing = Config::from_lookup(|k| if k == "OAUTH_CLIENT_ID" { None } else { env.get(k).map(|v| v.to_string()) });
        assert!(matches!(missing, Err(RpError::MissingConfiguration(f)) if f == "OAUTH_CLIENT_ID"));
    }
}
