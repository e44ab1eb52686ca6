//! Tenant discovery against the connections endpoint
//!
//! `GET /connections` with the current bearer token returns one record per
//! organisation (tenant) the token is authorized for. Only `tenantId` is
//! required; everything else is passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

/// One authorized tenant as reported by the connections endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Connection id (used to disconnect a tenant)
    #[serde(default)]
    pub id: Option<String>,
    pub tenant_id: String,
    /// e.g. "ORGANISATION" or "PRACTICEMANAGER"
    #[serde(default)]
    pub tenant_type: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fetch the connections visible to `access_token`, in response order.
pub async fn fetch_connections(
    http: &reqwest::Client,
    connections_url: &str,
    access_token: &str,
) -> Result<Vec<Connection>> {
    let response = http
        .get(connections_url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| Error::TenantDiscovery {
            status: None,
            body: format!("connections request failed: {e}"),
        })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));

    if !status.is_success() {
        return Err(Error::TenantDiscovery {
            status: Some(status.as_u16()),
            body,
        });
    }

    let connections: Vec<Connection> =
        serde_json::from_str(&body).map_err(|e| Error::TenantDiscovery {
            status: Some(status.as_u16()),
            body: format!("invalid connections response: {e}: {body}"),
        })?;
    debug!(count = connections.len(), "fetched connections");
    Ok(connections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_deserializes_with_passthrough_fields() {
        let json = r#"{
            "id": "c-1",
            "authEventId": "e-1",
            "tenantId": "t-1",
            "tenantType": "ORGANISATION",
            "tenantName": "Demo Company (NZ)",
            "createdDateUtc": "2024-01-01T00:00:00.0000000",
            "updatedDateUtc": "2024-01-02T00:00:00.0000000"
        }"#;
        let connection: Connection = serde_json::from_str(json).unwrap();
        assert_eq!(connection.tenant_id, "t-1");
        assert_eq!(connection.tenant_type.as_deref(), Some("ORGANISATION"));
        assert_eq!(connection.extra["authEventId"], "e-1");
        assert!(connection.extra.contains_key("createdDateUtc"));
    }

    #[test]
    fn only_tenant_id_is_required() {
        let connection: Connection = serde_json::from_str(r#"{"tenantId":"t-9"}"#).unwrap();
        assert_eq!(connection.tenant_id, "t-9");
        assert!(connection.id.is_none());
        assert!(serde_json::from_str::<Connection>(r#"{"id":"c-1"}"#).is_err());
    }
}
