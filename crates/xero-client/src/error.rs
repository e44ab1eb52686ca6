//! Error types for API client operations

/// Errors surfaced by `XeroClient` and `AccountingApi`.
///
/// Identity provider errors are mapped by the operation that triggered them,
/// so a rejected refresh is always `Refresh` even if the provider reported it
/// as a generic token endpoint failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("provider discovery failed: {0}")]
    Discovery(String),

    #[error("authorization code exchange failed: {0}")]
    TokenExchange(String),

    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("not authenticated: no token set")]
    NotAuthenticated,

    #[error("not authenticated: token set has no refresh token")]
    MissingRefreshToken,

    #[error("tenant discovery failed (status {status:?}): {body}")]
    TenantDiscovery { status: Option<u16>, body: String },

    #[error("API request failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid identity token: {0}")]
    InvalidIdToken(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
