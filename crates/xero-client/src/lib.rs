//! Authenticated Xero API client
//!
//! `XeroClient` owns one token-set at a time and keeps the REST facade's
//! bearer token in step with it. Tenant discovery runs after every token
//! acquisition and refresh; the tenant list is cleared whenever the token
//! changes so it can never outlive the token it was derived from.
//!
//! Session lifecycle:
//! 1. `XeroClient::build_consent_url()` → user authorizes in a browser
//! 2. `XeroClient::complete_authorization()` with the redirect URL or a pasted code
//! 3. `AccountingApi` calls scoped to one of `XeroClient::tenant_ids()`
//! 4. `XeroClient::refresh()` before `TokenSet::expires_at`
//! 5. `XeroClient::export_token_set()` → persist → `import_token_set()` on restart

pub mod accounting;
pub mod client;
pub mod connections;
pub mod error;
pub mod session;
mod telemetry;

pub use accounting::AccountingApi;
pub use client::{AuthorizationCompletion, XeroClient};
pub use connections::{Connection, fetch_connections};
pub use error::{Error, Result};
pub use session::{AuthEvent, AuthState, handle_event};
pub use xero_auth::{ClientConfig, Endpoints, IdentityProvider, OpenIdProvider, TokenSet};
