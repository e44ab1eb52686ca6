//! Authenticated API client
//!
//! Owns the token-set, the tenant list and the REST facade. Methods that
//! change authentication state take `&mut self`, so one instance can never
//! run two of them at once; callers sharing a client across tasks wrap it in
//! their own lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use url::Url;
use xero_auth::{
    AuthorizationParams, AuthorizationRequest, ClientConfig, CodeExchange, IdTokenChecks,
    IdentityProvider, OpenIdProvider, ProviderMetadata, TokenSet, now_secs,
};

use crate::accounting::AccountingApi;
use crate::connections::{Connection, fetch_connections};
use crate::error::{Error, Result};
use crate::session::{AuthEvent, AuthState, handle_event};
use crate::telemetry;

/// Transport timeout for the default HTTP client.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the user's consent comes back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationCompletion {
    /// Full URL the browser was redirected to, carrying `code` and `state`.
    Redirect { url: String },
    /// Code the user copied from the provider's page when no callback is
    /// reachable. `request_token` is the `state` of the pending consent request.
    VerifierCode { request_token: String, code: String },
}

#[derive(Debug)]
struct Tenants {
    ids: Vec<String>,
    connections: Vec<Connection>,
}

pub struct XeroClient {
    config: Arc<ClientConfig>,
    provider: Arc<dyn IdentityProvider>,
    http: reqwest::Client,
    accounting: AccountingApi,
    state: AuthState,
    metadata: Option<ProviderMetadata>,
    pending: Option<AuthorizationRequest>,
    token_set: Option<TokenSet>,
    /// `None` until discovered for the current token-set
    tenants: Option<Tenants>,
}

impl XeroClient {
    /// Client backed by the OpenID provider at `config.endpoints.issuer`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;
        let provider = Arc::new(OpenIdProvider::new(http.clone(), &config));
        Self::with_provider(config, provider, http)
    }

    /// Client with an injected identity provider and HTTP client.
    pub fn with_provider(
        config: impl Into<Arc<ClientConfig>>,
        provider: Arc<dyn IdentityProvider>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let config = config.into();
        config
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let accounting = AccountingApi::new(http.clone(), &config.endpoints.accounting_base_url);
        Ok(Self {
            config,
            provider,
            http,
            accounting,
            state: AuthState::Unauthenticated,
            metadata: None,
            pending: None,
            token_set: None,
            tenants: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current lifecycle state. An authenticated session whose token has
    /// passed `expires_at` reports `Expired`.
    pub fn state(&self) -> AuthState {
        match (&self.state, &self.token_set) {
            (AuthState::Authenticated, Some(set)) if set.is_expired() => AuthState::Expired,
            (state, _) => *state,
        }
    }

    /// REST facade authenticated with the current access token.
    pub fn accounting_api(&self) -> &AccountingApi {
        &self.accounting
    }

    pub fn token_set(&self) -> Option<&TokenSet> {
        self.token_set.as_ref()
    }

    /// `state` of the consent request awaiting completion. This is the
    /// `request_token` for `AuthorizationCompletion::VerifierCode`.
    pub fn pending_request_token(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.state.as_str())
    }

    /// Tenant ids in the order the connections endpoint returned them.
    /// Empty until discovery has run for the current token-set.
    pub fn tenant_ids(&self) -> &[String] {
        self.tenants.as_ref().map_or(&[], |t| t.ids.as_slice())
    }

    pub fn connections(&self) -> &[Connection] {
        self.tenants.as_ref().map_or(&[], |t| t.connections.as_slice())
    }

    /// Whether `tenant_ids()` reflects the current token-set.
    pub fn tenants_discovered(&self) -> bool {
        self.tenants.is_some()
    }

    /// Unverified claims from the identity token, if one was issued.
    pub fn id_token_claims(&self) -> Result<Option<Map<String, Value>>> {
        let set = self.token_set.as_ref().ok_or(Error::NotAuthenticated)?;
        set.claims()
            .map_err(|e| Error::InvalidIdToken(e.to_string()))
    }

    /// Build the URL the user visits to grant access.
    ///
    /// Discovers the provider on first use and starts a new consent request;
    /// any earlier pending request is replaced.
    pub async fn build_consent_url(&mut self) -> Result<Url> {
        let metadata = self
            .ensure_metadata()
            .await
            .map_err(|e| map_auth_error(e, Error::Discovery))?;

        let request = AuthorizationRequest::new(self.config.use_pkce);
        let scope = self.config.scope_param();
        let challenge = request.code_challenge();
        let url = self
            .provider
            .authorization_url(
                &metadata,
                &AuthorizationParams {
                    redirect_uri: self.config.primary_redirect_uri(),
                    scope: &scope,
                    state: &request.state,
                    nonce: &request.nonce,
                    code_challenge: challenge.as_deref(),
                },
            )
            .map_err(|e| map_auth_error(e, Error::Discovery))?;

        self.pending = Some(request);
        self.transition(AuthEvent::ConsentRequested);
        info!(scope, pkce = challenge.is_some(), "consent URL built");
        Ok(url)
    }

    /// Exchange the user's consent for a token-set, then discover tenants.
    ///
    /// On a rejected exchange the pending request is kept so the user can try
    /// again. A tenant discovery failure is returned after the token-set has
    /// been installed; the client stays authenticated.
    pub async fn complete_authorization(
        &mut self,
        completion: AuthorizationCompletion,
    ) -> Result<()> {
        let (expected_state, nonce, code_verifier) = match self.pending.as_ref() {
            Some(pending) => (
                pending.state.clone(),
                pending.nonce.clone(),
                pending.code_verifier.clone(),
            ),
            None => {
                return Err(Error::TokenExchange(
                    "no consent request in progress; build a consent URL first".into(),
                ));
            }
        };

        let code = match completion {
            AuthorizationCompletion::Redirect { url } => code_from_redirect(&url, &expected_state)?,
            AuthorizationCompletion::VerifierCode {
                request_token,
                code,
            } => {
                if request_token != expected_state {
                    return Err(Error::TokenExchange(
                        "request token does not match the pending consent request".into(),
                    ));
                }
                let code = code.trim();
                if code.is_empty() {
                    return Err(Error::TokenExchange("verifier code is empty".into()));
                }
                code.to_string()
            }
        };

        let metadata = self
            .ensure_metadata()
            .await
            .map_err(|e| map_auth_error(e, Error::TokenExchange))?;

        let result = self
            .provider
            .exchange_code(
                &metadata,
                CodeExchange {
                    redirect_uri: self.config.primary_redirect_uri(),
                    code: &code,
                    code_verifier: code_verifier.as_deref(),
                },
            )
            .await
            .map_err(|e| map_auth_error(e, Error::TokenExchange))
            .and_then(|set| require_access_token(set, Error::TokenExchange))
            .and_then(|set| {
                self.check_id_token(set, &metadata, Some(nonce.as_str()), Error::TokenExchange)
            });
        telemetry::record_exchange(&result);

        let token_set = match result {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "authorization code exchange rejected");
                self.transition(AuthEvent::ExchangeRejected);
                return Err(e);
            }
        };

        self.pending = None;
        let expires_at = token_set.expires_at;
        self.install_token_set(token_set).await;
        self.tenants = None;
        self.transition(AuthEvent::TokensIssued);
        info!(expires_at, "authorization complete");

        self.discover_tenants().await?;
        Ok(())
    }

    /// Exchange the refresh token for a new token-set, then rediscover tenants.
    ///
    /// Never retried internally. On rejection the previous token-set is kept
    /// and the state becomes `Failed`; the caller should run consent again.
    pub async fn refresh(&mut self) -> Result<()> {
        let current = self.token_set.as_ref().ok_or(Error::NotAuthenticated)?;
        let refresh_token = current
            .refresh_token()
            .ok_or(Error::MissingRefreshToken)?
            .to_string();

        let metadata = self
            .ensure_metadata()
            .await
            .map_err(|e| map_auth_error(e, Error::Refresh))?;

        self.transition(AuthEvent::RefreshStarted);
        debug!("refreshing token set");

        let result = self
            .provider
            .refresh(&metadata, &refresh_token)
            .await
            .map_err(|e| map_auth_error(e, Error::Refresh))
            .and_then(|set| require_access_token(set, Error::Refresh))
            .and_then(|set| self.check_id_token(set, &metadata, None, Error::Refresh));
        telemetry::record_refresh(&result);

        let token_set = match result {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "token refresh rejected");
                self.transition(AuthEvent::RefreshRejected);
                return Err(e);
            }
        };

        let expires_at = token_set.expires_at;
        self.install_token_set(token_set).await;
        self.tenants = None;
        self.transition(AuthEvent::TokensIssued);
        info!(expires_at, "token set refreshed");

        self.discover_tenants().await?;
        Ok(())
    }

    /// Copy of the active token-set for the caller's datastore.
    pub fn export_token_set(&self) -> Option<TokenSet> {
        self.token_set.clone()
    }

    /// Adopt a previously exported token-set.
    ///
    /// The facade uses the imported access token straight away. Tenants are
    /// not discovered here; a previously discovered tenant list is kept until
    /// the token rotates. Call `discover_tenants()` or `refresh()` to fill it.
    pub async fn import_token_set(&mut self, token_set: TokenSet) -> Result<()> {
        if token_set.access_token.is_empty() {
            return Err(Error::NotAuthenticated);
        }
        let expires_at = token_set.expires_at;
        self.install_token_set(token_set).await;
        self.transition(AuthEvent::TokensImported);
        info!(expires_at, "token set imported");
        Ok(())
    }

    /// Replace the tenant list with the connections visible to the current
    /// access token. On failure both the token-set and the previous tenant
    /// list are left alone.
    pub async fn discover_tenants(&mut self) -> Result<&[String]> {
        let access_token = self
            .token_set
            .as_ref()
            .ok_or(Error::NotAuthenticated)?
            .access_token
            .clone();

        let result = fetch_connections(
            &self.http,
            &self.config.endpoints.connections_url,
            &access_token,
        )
        .await;
        telemetry::record_discovery(&result);

        let connections = match result {
            Ok(connections) => connections,
            Err(e) => {
                warn!(error = %e, "tenant discovery failed");
                return Err(e);
            }
        };

        let ids: Vec<String> = connections.iter().map(|c| c.tenant_id.clone()).collect();
        info!(tenants = ids.len(), "tenant discovery complete");
        self.tenants = Some(Tenants { ids, connections });
        Ok(self.tenant_ids())
    }

    async fn ensure_metadata(&mut self) -> xero_auth::Result<ProviderMetadata> {
        if let Some(metadata) = &self.metadata {
            return Ok(metadata.clone());
        }
        let metadata = self.provider.discover().await?;
        debug!(issuer = %metadata.issuer, "provider discovered");
        self.metadata = Some(metadata.clone());
        Ok(metadata)
    }

    /// Swap in a new token-set. The facade token and the client's token-set
    /// change under one write lock, so no request can observe one without the
    /// other. Callers that rotate the token also drop the tenant list.
    async fn install_token_set(&mut self, token_set: TokenSet) {
        let mut facade_token = self.accounting.token_cell().write().await;
        *facade_token = Some(Secret::new(token_set.access_token.clone()));
        self.token_set = Some(token_set);
    }

    fn check_id_token(
        &self,
        set: TokenSet,
        metadata: &ProviderMetadata,
        nonce: Option<&str>,
        context: fn(String) -> Error,
    ) -> Result<TokenSet> {
        let checks = IdTokenChecks {
            issuer: &metadata.issuer,
            client_id: &self.config.client_id,
            nonce,
        };
        set.validate_id_token(&checks, now_secs())
            .map_err(|e| context(e.to_string()))?;
        Ok(set)
    }

    fn transition(&mut self, event: AuthEvent) {
        let next = handle_event(self.state, event);
        if next != self.state {
            debug!(from = self.state.label(), to = next.label(), ?event, "auth state transition");
        }
        self.state = next;
    }
}

impl std::fmt::Debug for XeroClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XeroClient")
            .field("client_id", &self.config.client_id)
            .field("state", &self.state)
            .field("token_set", &self.token_set)
            .field("tenants", &self.tenant_ids())
            .finish_non_exhaustive()
    }
}

/// Map an identity provider error into the taxonomy of the calling operation.
fn map_auth_error(err: xero_auth::Error, context: fn(String) -> Error) -> Error {
    match err {
        xero_auth::Error::Discovery(msg) => Error::Discovery(msg),
        xero_auth::Error::InvalidConfig(msg) => Error::InvalidConfig(msg),
        other => context(other.to_string()),
    }
}

fn require_access_token(set: TokenSet, context: fn(String) -> Error) -> Result<TokenSet> {
    if set.access_token.is_empty() {
        return Err(context("provider returned an empty access token".into()));
    }
    Ok(set)
}

/// Pull the authorization code out of a redirect-back URL.
///
/// Parameter order is irrelevant and unknown parameters are ignored. The
/// `state` must match the pending request.
fn code_from_redirect(raw: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(raw)
        .map_err(|e| Error::TokenExchange(format!("invalid redirect URL: {e}")))?;
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        return Err(Error::TokenExchange(format!(
            "authorization denied ({error}){description}"
        )));
    }

    match params.get("state") {
        Some(state) if state == expected_state => {}
        Some(_) => {
            return Err(Error::TokenExchange(
                "state in redirect does not match the pending consent request".into(),
            ));
        }
        None => return Err(Error::TokenExchange("redirect is missing state".into())),
    }

    params
        .get("code")
        .filter(|c| !c.is_empty())
        .cloned()
        .ok_or_else(|| Error::TokenExchange("redirect is missing code".into()))
}
