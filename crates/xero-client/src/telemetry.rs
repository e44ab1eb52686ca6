//! Counters for token and tenant operations
//!
//! No-ops until the embedding application installs a `metrics` recorder.
//!
//! - `xero_token_exchange_total` (counter): label `outcome`
//! - `xero_token_refresh_total` (counter): label `outcome`
//! - `xero_tenant_discovery_total` (counter): label `outcome`

fn outcome<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "failure" }
}

pub(crate) fn record_exchange<T, E>(result: &Result<T, E>) {
    metrics::counter!("xero_token_exchange_total", "outcome" => outcome(result)).increment(1);
}

pub(crate) fn record_refresh<T, E>(result: &Result<T, E>) {
    metrics::counter!("xero_token_refresh_total", "outcome" => outcome(result)).increment(1);
}

pub(crate) fn record_discovery<T, E>(result: &Result<T, E>) {
    metrics::counter!("xero_tenant_discovery_total", "outcome" => outcome(result)).increment(1);
}
