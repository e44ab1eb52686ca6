//! Xero identity provider plumbing
//!
//! Everything the API client needs from the OpenID Connect side of Xero:
//! client configuration, the token-set model, authorization request state
//! (state, nonce, optional PKCE), the narrow `IdentityProvider` capability
//! with its reqwest-backed OpenID implementation, and a file-backed store
//! for exported token-sets.
//!
//! Authorization flow:
//! 1. `IdentityProvider::discover()` fetches the provider metadata
//! 2. `AuthorizationRequest::new()` + `IdentityProvider::authorization_url()`
//!    produce the consent URL
//! 3. `IdentityProvider::exchange_code()` turns the returned code into a `TokenSet`
//! 4. `IdentityProvider::refresh()` mints a new `TokenSet` before expiry
//! 5. Callers persist exported sets with `TokenStore::put()`

pub mod config;
pub mod constants;
pub mod error;
pub mod openid;
pub mod pkce;
pub mod provider;
pub mod store;
pub mod token;

pub use config::{ClientConfig, Endpoints};
pub use constants::*;
pub use error::{Error, Result};
pub use openid::OpenIdProvider;
pub use pkce::{AuthorizationRequest, build_authorization_url, compute_challenge, generate_verifier};
pub use provider::{AuthorizationParams, BoxFuture, CodeExchange, IdentityProvider, ProviderMetadata};
pub use store::TokenStore;
pub use token::{IdTokenChecks, TokenResponse, TokenSet, now_secs};
