//! OpenID Connect provider over reqwest
//!
//! Discovery is a GET on the issuer's well-known document. Code exchange and
//! refresh both POST to the discovered token endpoint with different grant
//! types, authenticating the client with HTTP Basic (`client_secret_basic`).

use common::Secret;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::constants::DISCOVERY_PATH;
use crate::error::{Error, Result};
use crate::pkce::build_authorization_url;
use crate::provider::{
    AuthorizationParams, BoxFuture, CodeExchange, IdentityProvider, ProviderMetadata,
};
use crate::token::{TokenResponse, TokenSet, now_secs};

/// Confidential OpenID client bound to one issuer and client registration.
pub struct OpenIdProvider {
    http: reqwest::Client,
    issuer: String,
    client_id: String,
    client_secret: Secret<String>,
}

impl OpenIdProvider {
    /// Timeouts and TLS settings come from the supplied `reqwest::Client`.
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            http,
            issuer: config.endpoints.issuer.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    async fn fetch_metadata(&self) -> Result<ProviderMetadata> {
        let url = format!("{}{DISCOVERY_PATH}", self.issuer);
        debug!(url, "fetching provider metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("discovery request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Discovery(format!(
                "discovery endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| Error::Discovery(format!("invalid discovery document: {e}")))
    }

    async fn post_token(
        &self,
        metadata: &ProviderMetadata,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        self.http
            .post(&metadata.token_endpoint)
            .basic_auth(&self.client_id, Some(self.client_secret.expose()))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token request failed: {e}")))
    }

    async fn exchange(
        &self,
        metadata: &ProviderMetadata,
        exchange: CodeExchange<'_>,
    ) -> Result<TokenSet> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", exchange.code),
            ("redirect_uri", exchange.redirect_uri),
        ];
        if let Some(verifier) = exchange.code_verifier {
            form.push(("code_verifier", verifier));
        }

        let response = self.post_token(metadata, &form).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;
        Ok(token.into_token_set(now_secs()))
    }

    async fn refresh_grant(
        &self,
        metadata: &ProviderMetadata,
        refresh_token: &str,
    ) -> Result<TokenSet> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self.post_token(metadata, &form).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // invalid_grant comes back as 400; 401/403 for a bad client
            if matches!(status.as_u16(), 400 | 401 | 403) {
                return Err(Error::InvalidCredentials(format!(
                    "refresh token rejected ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "token refresh returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;
        let mut set = token.into_token_set(now_secs());
        // Providers without rotation omit the refresh token; keep using the old one
        if set.refresh_token().is_none() {
            set.refresh_token = Some(refresh_token.to_string());
        }
        Ok(set)
    }
}

impl IdentityProvider for OpenIdProvider {
    fn discover(&self) -> BoxFuture<'_, Result<ProviderMetadata>> {
        Box::pin(self.fetch_metadata())
    }

    fn authorization_url(
        &self,
        metadata: &ProviderMetadata,
        params: &AuthorizationParams<'_>,
    ) -> Result<Url> {
        build_authorization_url(metadata, &self.client_id, params)
    }

    fn exchange_code<'a>(
        &'a self,
        metadata: &'a ProviderMetadata,
        exchange: CodeExchange<'a>,
    ) -> BoxFuture<'a, Result<TokenSet>> {
        Box::pin(self.exchange(metadata, exchange))
    }

    fn refresh<'a>(
        &'a self,
        metadata: &'a ProviderMetadata,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<TokenSet>> {
        Box::pin(self.refresh_grant(metadata, refresh_token))
    }
}
