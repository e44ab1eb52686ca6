//! Authentication state machine
//!
//! Pure state machine: receives events, returns the next state. `XeroClient`
//! performs the I/O and feeds the outcome back in.
//!
//! ```text
//! Unauthenticated ─ConsentRequested─▶ AwaitingConsent ─TokensIssued─▶ Authenticated
//!                                      │  ▲                           │  ▲
//!                                      └──┘ ExchangeRejected  RefreshStarted  TokensIssued
//!                                                                     ▼  │
//!                                                                   Refreshing ─RefreshRejected─▶ Failed
//! ```
//!
//! `Expired` is never produced here; the client reports it when the state is
//! `Authenticated` but the token-set's expiry has passed.

/// Where a client is in its token lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No token-set and no consent in progress
    Unauthenticated,
    /// Consent URL issued, waiting for the redirect or verifier code
    AwaitingConsent,
    /// Holding a live token-set
    Authenticated,
    /// Refresh grant in flight
    Refreshing,
    /// Holding a token-set whose access token has expired
    Expired,
    /// Refresh rejected by the provider; consent must be run again
    Failed,
}

impl AuthState {
    /// Status label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::AwaitingConsent => "awaiting_consent",
            AuthState::Authenticated => "authenticated",
            AuthState::Refreshing => "refreshing",
            AuthState::Expired => "expired",
            AuthState::Failed => "failed",
        }
    }
}

/// Outcomes that drive state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A consent URL was built and its request handle stored
    ConsentRequested,
    /// Code exchange or refresh produced a new token-set
    TokensIssued,
    /// Provider rejected the authorization code
    ExchangeRejected,
    /// Refresh grant about to be sent
    RefreshStarted,
    /// Provider rejected the refresh token
    RefreshRejected,
    /// A previously exported token-set was imported
    TokensImported,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: AuthState, event: AuthEvent) -> AuthState {
    match (state, event) {
        // Re-consent never interrupts a refresh, and a held token-set keeps
        // serving until the new one is issued
        (
            state @ (AuthState::Refreshing | AuthState::Authenticated | AuthState::Expired),
            AuthEvent::ConsentRequested,
        ) => state,
        (_, AuthEvent::ConsentRequested) => AuthState::AwaitingConsent,

        (
            AuthState::AwaitingConsent
            | AuthState::Refreshing
            | AuthState::Authenticated
            | AuthState::Expired,
            AuthEvent::TokensIssued,
        ) => AuthState::Authenticated,

        (AuthState::AwaitingConsent, AuthEvent::ExchangeRejected) => AuthState::AwaitingConsent,

        (
            AuthState::Authenticated | AuthState::Expired | AuthState::Failed,
            AuthEvent::RefreshStarted,
        ) => AuthState::Refreshing,

        (AuthState::Refreshing, AuthEvent::RefreshRejected) => AuthState::Failed,

        (AuthState::Refreshing, AuthEvent::TokensImported) => AuthState::Refreshing,
        (_, AuthEvent::TokensImported) => AuthState::Authenticated,

        // Invalid/unhandled transition: stay in current state
        (state, _event) => state,
    }
}
