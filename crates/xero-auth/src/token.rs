//! Token-set model
//!
//! The token endpoint answers both code exchange and refresh with a
//! `TokenResponse` whose `expires_in` is a delta in seconds. It is pinned to
//! an absolute `expires_at` the moment it is received, so a persisted
//! `TokenSet` stays meaningful after a process restart.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{DEFAULT_EXPIRES_IN_SECS, ID_TOKEN_CLOCK_TOLERANCE_SECS};
use crate::error::{Error, Result};

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Raw token endpoint response for both exchange and refresh.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// Pin the relative expiry to `now` (unix seconds).
    ///
    /// `expires_in: 0` yields a set that is already expired (`expires_at ==
    /// now`); it is kept as issued rather than rejected, and `refresh()` is
    /// the way out. Oversized values saturate at `u64::MAX`.
    pub fn into_token_set(self, now: u64) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now.saturating_add(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
            token_type: self.token_type.unwrap_or_else(default_token_type),
            id_token: self.id_token,
            scope: self.scope,
            extra: self.extra,
        }
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Access token, refresh token, expiry and identity token issued by the provider.
///
/// This is the exported session state. It round-trips through JSON without
/// loss; provider fields not modelled here are kept in `extra`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiration as unix timestamp in seconds
    pub expires_at: u64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenSet {
    /// The refresh token, if one was issued and is non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// True when the token expires within `window` from now. Callers use this
    /// to schedule `refresh()` ahead of expiry.
    pub fn expires_within(&self, window: Duration) -> bool {
        self.expires_at <= now_secs().saturating_add(window.as_secs())
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.expires_at.saturating_sub(now_secs()))
    }

    /// Claims carried in the identity token payload.
    ///
    /// The payload is decoded without verifying the signature. Returns `None`
    /// when no identity token was issued (e.g. `openid` scope not requested).
    pub fn claims(&self) -> Result<Option<Map<String, Value>>> {
        let Some(id_token) = self.id_token.as_deref() else {
            return Ok(None);
        };
        let payload = id_token.split('.').nth(1).ok_or_else(|| {
            Error::CredentialParse("id_token is not a compact JWT".into())
        })?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::CredentialParse(format!("decoding id_token payload: {e}")))?;
        let claims: Map<String, Value> = serde_json::from_slice(&bytes)
            .map_err(|e| Error::CredentialParse(format!("parsing id_token claims: {e}")))?;
        Ok(Some(claims))
    }
}

/// Values the identity token's registered claims must carry.
#[derive(Debug, Clone, Copy)]
pub struct IdTokenChecks<'a> {
    pub issuer: &'a str,
    pub client_id: &'a str,
    /// Nonce of the consent request; `None` skips the check (refresh).
    pub nonce: Option<&'a str>,
}

impl TokenSet {
    /// Check `iss`, `aud`, `exp` and `nonce` of the identity token at `now`.
    ///
    /// Signatures are not verified. A set without an identity token passes.
    pub fn validate_id_token(&self, checks: &IdTokenChecks<'_>, now: u64) -> Result<()> {
        let Some(claims) = self.claims()? else {
            return Ok(());
        };

        let issuer = claims.get("iss").and_then(Value::as_str);
        if issuer != Some(checks.issuer) {
            return Err(Error::InvalidIdToken(format!(
                "iss {issuer:?} does not match {}",
                checks.issuer
            )));
        }

        let audience_ok = match claims.get("aud") {
            Some(Value::String(aud)) => aud == checks.client_id,
            Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(checks.client_id)),
            _ => false,
        };
        if !audience_ok {
            return Err(Error::InvalidIdToken(format!(
                "aud does not contain client {}",
                checks.client_id
            )));
        }

        let exp = claims
            .get("exp")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::InvalidIdToken("missing exp".into()))?;
        if exp.saturating_add(ID_TOKEN_CLOCK_TOLERANCE_SECS) <= now {
            return Err(Error::InvalidIdToken(format!("expired at {exp}")));
        }

        if let Some(expected) = checks.nonce {
            if claims.get("nonce").and_then(Value::as_str) != Some(expected) {
                return Err(Error::InvalidIdToken(
                    "nonce does not match the consent request".into(),
                ));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_token_for(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    fn token_set() -> TokenSet {
        TokenSet {
            access_token: "at_abc".into(),
            refresh_token: Some("rt_def".into()),
            expires_at: 1_900_000_000,
            token_type: "Bearer".into(),
            id_token: Some(id_token_for(r#"{"email":"jo@example.com","xero_userid":"u-1"}"#)),
            scope: Some("openid offline_access".into()),
            extra: Map::new(),
        }
    }

    #[test]
    fn token_response_pins_expiry_to_now() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","expires_in":1800,"token_type":"Bearer"}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let set = response.into_token_set(1_000);
        assert_eq!(set.expires_at, 2_800);
        assert_eq!(set.refresh_token(), Some("rt_def"));
    }

    #[test]
    fn missing_expires_in_uses_default_lifetime() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        let set = response.into_token_set(100);
        assert_eq!(set.expires_at, 100 + DEFAULT_EXPIRES_IN_SECS);
        assert_eq!(set.token_type, "Bearer");
        assert!(set.refresh_token().is_none());
    }

    #[test]
    fn json_roundtrip_keeps_unknown_fields() {
        let json = r#"{"access_token":"at","refresh_token":"rt","expires_at":42,"token_type":"Bearer","session_state":"s-1"}"#;
        let set: TokenSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.extra.get("session_state"), Some(&Value::from("s-1")));

        let back: TokenSet = serde_json::from_str(&serde_json::to_string(&set).unwrap()).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn empty_refresh_token_is_treated_as_absent() {
        let mut set = token_set();
        set.refresh_token = Some(String::new());
        assert!(set.refresh_token().is_none());
    }

    #[test]
    fn expiry_checks() {
        let set = token_set();
        assert!(!set.is_expired_at(1_899_999_999));
        assert!(set.is_expired_at(1_900_000_000));

        let mut soon = token_set();
        soon.expires_at = now_secs() + 60;
        assert!(soon.expires_within(Duration::from_secs(300)));
        assert!(!soon.expires_within(Duration::from_secs(10)));
        assert!(soon.remaining() <= Duration::from_secs(60));
    }

    #[test]
    fn claims_decode_id_token_payload() {
        let claims = token_set().claims().unwrap().unwrap();
        assert_eq!(claims["email"], "jo@example.com");
        assert_eq!(claims["xero_userid"], "u-1");
    }

    #[test]
    fn claims_none_without_id_token() {
        let mut set = token_set();
        set.id_token = None;
        assert!(set.claims().unwrap().is_none());
    }

    #[test]
    fn malformed_id_token_is_a_parse_error() {
        let mut set = token_set();
        set.id_token = Some("not-a-jwt".into());
        assert!(matches!(set.claims(), Err(Error::CredentialParse(_))));
    }

    #[test]
    fn debug_redacts_tokens() {
        let debug = format!("{:?}", token_set());
        assert!(!debug.contains("at_abc"), "got: {debug}");
        assert!(!debug.contains("rt_def"), "got: {debug}");
        assert!(debug.contains("expires_at"));
    }

    #[test]
    fn oversized_expires_in_saturates() {
        let response: TokenResponse =
            serde_json::from_str(&format!(r#"{{"access_token":"at","expires_in":{}}}"#, u64::MAX))
                .unwrap();
        let set = response.into_token_set(1_000);
        assert_eq!(set.expires_at, u64::MAX);
        assert!(!set.is_expired());
        assert!(set.expires_within(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn zero_expires_in_is_already_expired() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"at","expires_in":0}"#).unwrap();
        let set = response.into_token_set(5_000);
        assert_eq!(set.expires_at, 5_000);
        assert!(set.is_expired_at(5_000));
    }

    const CHECKS: IdTokenChecks<'static> = IdTokenChecks {
        issuer: "https://identity.xero.com",
        client_id: "client-abc",
        nonce: Some("n-1"),
    };

    fn with_claims(claims: &str) -> TokenSet {
        let mut set = token_set();
        set.id_token = Some(id_token_for(claims));
        set
    }

    #[test]
    fn id_token_with_matching_claims_passes() {
        let set = with_claims(
            r#"{"iss":"https://identity.xero.com","aud":"client-abc","exp":2000,"nonce":"n-1"}"#,
        );
        set.validate_id_token(&CHECKS, 1_000).unwrap();

        // aud may be a list
        let set = with_claims(
            r#"{"iss":"https://identity.xero.com","aud":["other","client-abc"],"exp":2000,"nonce":"n-1"}"#,
        );
        set.validate_id_token(&CHECKS, 1_000).unwrap();
    }

    #[test]
    fn id_token_exp_allows_clock_skew() {
        let set = with_claims(
            r#"{"iss":"https://identity.xero.com","aud":"client-abc","exp":1000,"nonce":"n-1"}"#,
        );
        set.validate_id_token(&CHECKS, 1_004).unwrap();
        assert!(matches!(
            set.validate_id_token(&CHECKS, 1_005),
            Err(Error::InvalidIdToken(_))
        ));
    }

    #[test]
    fn id_token_with_wrong_claims_is_rejected() {
        let cases = [
            r#"{"iss":"https://evil.example.com","aud":"client-abc","exp":2000,"nonce":"n-1"}"#,
            r#"{"iss":"https://identity.xero.com","aud":"someone-else","exp":2000,"nonce":"n-1"}"#,
            r#"{"iss":"https://identity.xero.com","aud":"client-abc","nonce":"n-1"}"#,
            r#"{"iss":"https://identity.xero.com","aud":"client-abc","exp":2000,"nonce":"forged"}"#,
            r#"{"iss":"https://identity.xero.com","aud":"client-abc","exp":2000}"#,
        ];
        for claims in cases {
            let result = with_claims(claims).validate_id_token(&CHECKS, 1_000);
            assert!(matches!(result, Err(Error::InvalidIdToken(_))), "accepted: {claims}");
        }
    }

    #[test]
    fn nonce_check_is_skipped_without_expected_nonce() {
        let set = with_claims(r#"{"iss":"https://identity.xero.com","aud":"client-abc","exp":2000}"#);
        let checks = IdTokenChecks { nonce: None, ..CHECKS };
        set.validate_id_token(&checks, 1_000).unwrap();
    }

    #[test]
    fn set_without_id_token_passes_validation() {
        let mut set = token_set();
        set.id_token = None;
        set.validate_id_token(&CHECKS, 1_000).unwrap();
    }
}
