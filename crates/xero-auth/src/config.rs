//! Client configuration
//!
//! Immutable once a client is built from it. The first redirect URI is the
//! canonical one: it is sent in the consent URL and again in the code
//! exchange, and the provider rejects the exchange when the two differ.

use common::Secret;
use url::Url;

use crate::constants::{ACCOUNTING_BASE_URL, CONNECTIONS_URL, DEFAULT_SCOPES, ISSUER};
use crate::error::{Error, Result};

/// Locations of the identity provider and the API.
///
/// Defaults point at production Xero; tests and sandboxes override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub issuer: String,
    pub connections_url: String,
    pub accounting_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            issuer: ISSUER.to_string(),
            connections_url: CONNECTIONS_URL.to_string(),
            accounting_base_url: ACCOUNTING_BASE_URL.to_string(),
        }
    }
}

/// OAuth2 client registration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    /// Send an S256 PKCE challenge with the consent URL.
    pub use_pkce: bool,
    pub endpoints: Endpoints,
}

impl ClientConfig {
    /// Build and validate a configuration with no explicit scopes.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uris: Vec<String>,
    ) -> Result<Self> {
        let config = Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            redirect_uris,
            scopes: Vec::new(),
            use_pkce: false,
            endpoints: Endpoints::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pkce(mut self, use_pkce: bool) -> Self {
        self.use_pkce = use_pkce;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Check the invariants a client relies on.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id must not be empty".into()));
        }
        if self.redirect_uris.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one redirect URI is required".into(),
            ));
        }
        for uri in &self.redirect_uris {
            let parsed = Url::parse(uri)
                .map_err(|e| Error::InvalidConfig(format!("redirect URI {uri:?}: {e}")))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(Error::InvalidConfig(format!(
                    "redirect URI must use http or https, got: {uri}"
                )));
            }
        }
        Ok(())
    }

    /// The redirect URI used for consent and code exchange.
    pub fn primary_redirect_uri(&self) -> &str {
        // validate() guarantees at least one entry
        self.redirect_uris.first().map(String::as_str).unwrap_or_default()
    }

    /// Space-joined scopes, or the baseline identity scopes when none are set.
    pub fn scope_param(&self) -> String {
        let joined = self
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            DEFAULT_SCOPES.to_string()
        } else {
            joined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new(
            "client-abc",
            "secret-xyz",
            vec![
                "https://app.example.com/callback".into(),
                "https://app.example.com/alt".into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn empty_scopes_default_to_identity_scopes() {
        assert_eq!(config().scope_param(), "openid email profile");
    }

    #[test]
    fn scopes_are_space_joined_in_order() {
        let config = config().with_scopes(["a", "b"]);
        assert_eq!(config.scope_param(), "a b");
    }

    #[test]
    fn blank_scope_entries_are_dropped() {
        let config = config().with_scopes(["", "  "]);
        assert_eq!(config.scope_param(), DEFAULT_SCOPES);
    }

    #[test]
    fn first_redirect_uri_is_primary() {
        assert_eq!(
            config().primary_redirect_uri(),
            "https://app.example.com/callback"
        );
    }

    #[test]
    fn rejects_missing_redirect_uris() {
        let err = ClientConfig::new("client", "secret", vec![]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_non_http_redirect_uri() {
        let err = ClientConfig::new("client", "secret", vec!["ftp://example.com/cb".into()])
            .unwrap_err();
        assert!(err.to_string().contains("http or https"), "got: {err}");
    }

    #[test]
    fn rejects_relative_redirect_uri() {
        assert!(ClientConfig::new("client", "secret", vec!["/callback".into()]).is_err());
    }

    #[test]
    fn rejects_empty_client_id() {
        let result = ClientConfig::new(" ", "secret", vec!["https://a.example/cb".into()]);
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("secret-xyz"), "got: {debug}");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn endpoints_default_to_production() {
        let endpoints = Endpoints::default();
        assert_eq!(endpoints.issuer, "https://identity.xero.com");
        assert_eq!(endpoints.connections_url, "https://api.xero.com/connections");
    }
}
