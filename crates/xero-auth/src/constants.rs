//! Xero identity and API endpoints
//!
//! Public, well-known locations. Client credentials are never constants;
//! they come from `ClientConfig`.

/// OpenID Connect issuer. Discovery lives at `{ISSUER}/.well-known/openid-configuration`.
pub const ISSUER: &str = "https://identity.xero.com";

/// Path appended to the issuer for the discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Lists the tenants the current access token is connected to.
pub const CONNECTIONS_URL: &str = "https://api.xero.com/connections";

/// Base URL of the accounting API.
pub const ACCOUNTING_BASE_URL: &str = "https://api.xero.com/api.xro/2.0";

/// Scope string sent when the configuration requests no scopes.
pub const DEFAULT_SCOPES: &str = "openid email profile";

/// Allowed clock skew when checking identity token `exp`.
pub const ID_TOKEN_CLOCK_TOLERANCE_SECS: u64 = 5;

/// Lifetime assumed when a token response omits `expires_in`.
/// Xero access tokens live for 30 minutes.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 1800;
