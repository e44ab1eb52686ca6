//! Authorization request state and consent URL construction
//!
//! Each consent URL carries a random `state` (CSRF binding, echoed back on the
//! redirect) and `nonce` (bound into the identity token). When PKCE is
//! enabled the request also holds an RFC 7636 code verifier whose S256
//! challenge goes into the URL; the verifier itself is only sent during the
//! code exchange.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};
use crate::provider::{AuthorizationParams, ProviderMetadata};

/// Generate a cryptographically random PKCE code verifier.
///
/// 64 random bytes encoded as URL-safe base64 without padding gives 86
/// characters, inside the 43-128 range RFC 7636 allows.
pub fn generate_verifier() -> String {
    random_token::<64>()
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

fn random_token<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Provider-side session handle created alongside a consent URL.
///
/// Held by the client until the authorization completes; the redirect must
/// echo `state` back unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub state: String,
    pub nonce: String,
    pub code_verifier: Option<String>,
}

impl AuthorizationRequest {
    pub fn new(use_pkce: bool) -> Self {
        Self {
            state: random_token::<32>(),
            nonce: random_token::<32>(),
            code_verifier: use_pkce.then(generate_verifier),
        }
    }

    pub fn code_challenge(&self) -> Option<String> {
        self.code_verifier.as_deref().map(compute_challenge)
    }
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("state", &self.state)
            .field("pkce", &self.code_verifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Build the consent URL on the provider's authorization endpoint.
///
/// Any query already present on the endpoint is preserved.
pub fn build_authorization_url(
    metadata: &ProviderMetadata,
    client_id: &str,
    params: &AuthorizationParams<'_>,
) -> Result<Url> {
    let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
        Error::Discovery(format!(
            "invalid authorization_endpoint {:?}: {e}",
            metadata.authorization_endpoint
        ))
    })?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", params.scope)
            .append_pair("redirect_uri", params.redirect_uri)
            .append_pair("state", params.state)
            .append_pair("nonce", params.nonce);
        if let Some(challenge) = params.code_challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", "S256");
        }
    }
    Ok(url)
}
