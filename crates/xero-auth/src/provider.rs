//! Identity provider abstraction
//!
//! The API client talks to the identity provider only through this trait:
//! discovery, consent URL construction, code exchange and refresh. Tests
//! substitute an in-memory stub; production uses `OpenIdProvider`.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::token::TokenSet;

/// Boxed future returned by provider operations.
///
/// `Pin<Box<dyn Future>>` keeps the trait dyn-compatible (`Arc<dyn IdentityProvider>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Subset of the OpenID discovery document the client uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
}

/// Per-request values that go into a consent URL.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationParams<'a> {
    pub redirect_uri: &'a str,
    /// Space-joined scope string
    pub scope: &'a str,
    pub state: &'a str,
    pub nonce: &'a str,
    pub code_challenge: Option<&'a str>,
}

/// Authorization code plus the values the token endpoint checks it against.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    /// Must equal the redirect URI sent in the consent URL
    pub redirect_uri: &'a str,
    pub code: &'a str,
    pub code_verifier: Option<&'a str>,
}

/// Narrow OpenID Connect capability used by the API client.
pub trait IdentityProvider: Send + Sync {
    /// Fetch the provider metadata (endpoints) from the discovery document.
    fn discover(&self) -> BoxFuture<'_, Result<ProviderMetadata>>;

    /// Build the consent URL. No I/O.
    fn authorization_url(
        &self,
        metadata: &ProviderMetadata,
        params: &AuthorizationParams<'_>,
    ) -> Result<Url>;

    /// Exchange an authorization code for a token-set.
    fn exchange_code<'a>(
        &'a self,
        metadata: &'a ProviderMetadata,
        exchange: CodeExchange<'a>,
    ) -> BoxFuture<'a, Result<TokenSet>>;

    /// Exchange a refresh token for a new token-set.
    ///
    /// Revoked or invalid refresh tokens surface as `Error::InvalidCredentials`.
    fn refresh<'a>(
        &'a self,
        metadata: &'a ProviderMetadata,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenSet>>;
}
