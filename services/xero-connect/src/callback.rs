//! Capturing the redirect back from the consent page
//!
//! A loopback redirect URI (`http://localhost:PORT/path`) gets a one-shot
//! axum listener that hands the first request on that path to the caller.
//! Any other redirect URI means the user pastes the result by hand.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{OriginalUri, State};
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;
use xero_client::AuthorizationCompletion;

const RECEIVED_PAGE: &str =
    "<html><body><p>Authorization received. You can close this window.</p></body></html>";

/// Where a loopback redirect URI should be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackTarget {
    pub addr: SocketAddr,
    pub path: String,
    /// Scheme, host and port used to rebuild the full redirect URL
    pub origin: String,
}

/// Loopback target for `redirect_uri`, or `None` when the provider will
/// redirect somewhere this process cannot listen.
pub fn loopback_target(redirect_uri: &str) -> Option<LoopbackTarget> {
    let url = Url::parse(redirect_uri).ok()?;
    if url.scheme() != "http" {
        return None;
    }
    match url.host_str()? {
        "localhost" | "127.0.0.1" => {}
        _ => return None,
    }
    let port = url.port_or_known_default()?;
    Some(LoopbackTarget {
        addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        path: url.path().to_string(),
        origin: url.origin().ascii_serialization(),
    })
}

/// Interpret a line the user pasted: a full URL is the redirect, anything
/// else is a verifier code for the pending consent request.
pub fn completion_from_input(line: &str, request_token: &str) -> AuthorizationCompletion {
    let line = line.trim();
    match Url::parse(line) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => AuthorizationCompletion::Redirect {
            url: line.to_string(),
        },
        _ => AuthorizationCompletion::VerifierCode {
            request_token: request_token.to_string(),
            code: line.to_string(),
        },
    }
}

#[derive(Clone)]
struct CallbackState {
    origin: String,
    tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

async fn callback_handler(
    State(state): State<CallbackState>,
    OriginalUri(uri): OriginalUri,
) -> Html<&'static str> {
    let redirect = format!("{}{}", state.origin, uri);
    if let Some(tx) = state.tx.lock().await.take() {
        debug!(path = uri.path(), "redirect captured");
        let _ = tx.send(redirect);
    }
    Html(RECEIVED_PAGE)
}

/// Listener bound to a loopback redirect URI.
pub struct CallbackListener {
    local_addr: SocketAddr,
    rx: oneshot::Receiver<String>,
    server: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind before the consent URL is shown so the redirect cannot race the
    /// listener.
    pub async fn bind(target: &LoopbackTarget) -> Result<Self> {
        let listener = TcpListener::bind(target.addr)
            .await
            .with_context(|| format!("failed to bind callback listener on {}", target.addr))?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel();
        let state = CallbackState {
            origin: target.origin.clone(),
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        let app = Router::new()
            .route(&target.path, get(callback_handler))
            .with_state(state);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "callback listener failed");
            }
        });

        info!(addr = %local_addr, path = %target.path, "waiting for consent redirect");
        Ok(Self {
            local_addr,
            rx,
            server,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the redirect and return its full URL. The listener is shut
    /// down either way.
    pub async fn wait(self, timeout: Duration) -> Result<String> {
        let result = tokio::time::timeout(timeout, self.rx).await;
        self.server.abort();
        match result {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(_)) => anyhow::bail!("callback listener stopped before a redirect arrived"),
            Err(_) => anyhow::bail!(
                "no redirect received within {}s; run authorize again",
                timeout.as_secs()
            ),
        }
    }
}
