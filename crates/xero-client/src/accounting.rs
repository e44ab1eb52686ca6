//! Accounting API facade
//!
//! A cloneable handle over the accounting endpoints. Every clone shares one
//! token cell with the owning `XeroClient`, and each request reads the cell
//! when it is sent, so a token installed by `refresh()` is used by every
//! request issued after `refresh()` returns.

use std::fmt;
use std::sync::Arc;

use common::Secret;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Header carrying the tenant a request is scoped to.
const TENANT_HEADER: &str = "xero-tenant-id";

pub(crate) type TokenCell = RwLock<Option<Secret<String>>>;

#[derive(Clone)]
pub struct AccountingApi {
    http: reqwest::Client,
    base_url: String,
    token: Arc<TokenCell>,
}

impl AccountingApi {
    pub(crate) fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// The shared cell the client writes new access tokens into.
    pub(crate) fn token_cell(&self) -> &TokenCell {
        &self.token
    }

    /// `Authorization` header value the next request will carry.
    pub async fn authorization_header(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .map(|token| format!("Bearer {}", token.expose()))
    }

    /// GET `{base_url}/{path}` scoped to `tenant_id`, returning the JSON body.
    pub async fn get(&self, tenant_id: &str, path: &str) -> Result<Value> {
        let authorization = self
            .authorization_header()
            .await
            .ok_or(Error::NotAuthenticated)?;
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(url, tenant_id, "accounting API request");

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, authorization)
            .header(TENANT_HEADER, tenant_id)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::Http(format!("accounting API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Http(format!("invalid accounting API response: {e}")))
    }

    pub async fn get_organisations(&self, tenant_id: &str) -> Result<Value> {
        self.get(tenant_id, "Organisation").await
    }

    pub async fn get_invoices(&self, tenant_id: &str) -> Result<Value> {
        self.get(tenant_id, "Invoices").await
    }

    pub async fn get_invoice(&self, tenant_id: &str, invoice_id: &str) -> Result<Value> {
        self.get(tenant_id, &format!("Invoices/{invoice_id}")).await
    }

    pub async fn get_contacts(&self, tenant_id: &str) -> Result<Value> {
        self.get(tenant_id, "Contacts").await
    }
}

impl fmt::Debug for AccountingApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountingApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
