//! Xero connect
//!
//! Operator CLI around `xero-client`:
//! 1. `authorize` runs the consent flow and saves the token-set
//! 2. `refresh` exchanges the saved refresh token for a new token-set
//! 3. `tenants` lists the organisations the saved token can reach
//! 4. `organisation` fetches the first tenant's organisation record

mod callback;
mod config;

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xero_auth::TokenStore;
use xero_client::{AuthState, AuthorizationCompletion, XeroClient};

use crate::callback::CallbackListener;
use crate::config::Config;

const USAGE: &str = "usage: xero-connect [--config PATH] <authorize|refresh|tenants|organisation>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Authorize,
    Refresh,
    Tenants,
    Organisation,
}

#[derive(Debug, PartialEq, Eq)]
struct Cli {
    config_path: Option<String>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let mut config_path = None;
    let mut command = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                config_path = Some(path.clone());
            }
            "authorize" => command = Some(Command::Authorize),
            "refresh" => command = Some(Command::Refresh),
            "tenants" => command = Some(Command::Tenants),
            "organisation" | "organization" => command = Some(Command::Organisation),
            other => anyhow::bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }
    let command = command.context(USAGE)?;
    Ok(Cli {
        config_path,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let client_config = config
        .client_config()
        .context("invalid [xero] configuration")?;

    info!(
        client_id = %client_config.client_id,
        redirect_uri = client_config.primary_redirect_uri(),
        profile = %config.session.profile,
        "configuration loaded"
    );

    let mut client = XeroClient::new(client_config).context("failed to build Xero client")?;
    let store = TokenStore::load(config.session.store_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open token store {}",
                config.session.store_path.display()
            )
        })?;
    let profile = config.session.profile.as_str();

    match cli.command {
        Command::Authorize => {
            let timeout = Duration::from_secs(config.session.callback_timeout_secs);
            authorize(&mut client, &store, profile, timeout).await
        }
        Command::Refresh => {
            restore(&mut client, &store, profile).await?;
            let outcome = client.refresh().await;
            save(&client, &store, profile).await?;
            outcome.context("token refresh failed")?;
            print_tenants(&client);
            Ok(())
        }
        Command::Tenants => {
            restore(&mut client, &store, profile).await?;
            client
                .discover_tenants()
                .await
                .context("tenant discovery failed")?;
            print_tenants(&client);
            Ok(())
        }
        Command::Organisation => {
            restore(&mut client, &store, profile).await?;
            let tenant = client
                .discover_tenants()
                .await
                .context("tenant discovery failed")?
                .first()
                .cloned()
                .context("the saved token has no connected tenants")?;
            let organisation = client
                .accounting_api()
                .get_organisations(&tenant)
                .await
                .with_context(|| format!("failed to fetch organisation for tenant {tenant}"))?;
            println!("{}", serde_json::to_string_pretty(&organisation)?);
            Ok(())
        }
    }
}

async fn authorize(
    client: &mut XeroClient,
    store: &TokenStore,
    profile: &str,
    timeout: Duration,
) -> Result<()> {
    let redirect_uri = client.config().primary_redirect_uri().to_string();

    // Bind first so a fast browser cannot beat the listener
    let listener = match callback::loopback_target(&redirect_uri) {
        Some(target) => Some(CallbackListener::bind(&target).await?),
        None => None,
    };

    let consent_url = client
        .build_consent_url()
        .await
        .context("failed to build consent URL")?;
    println!("Open this URL in a browser and grant access:\n\n  {consent_url}\n");

    let completion = match listener {
        Some(listener) => AuthorizationCompletion::Redirect {
            url: listener.wait(timeout).await?,
        },
        None => {
            println!("Paste the URL you were redirected to, or the code shown:");
            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .context("failed to read from stdin")?;
            let request_token = client
                .pending_request_token()
                .context("consent request was lost")?;
            callback::completion_from_input(&line, request_token)
        }
    };

    let outcome = client.complete_authorization(completion).await;
    save(client, store, profile).await?;
    outcome.context("authorization failed")?;
    print_tenants(client);
    Ok(())
}

/// Import the profile's saved token-set into the client.
async fn restore(client: &mut XeroClient, store: &TokenStore, profile: &str) -> Result<()> {
    let token_set = store.get(profile).await.with_context(|| {
        format!("no saved token set for profile '{profile}'; run `xero-connect authorize` first")
    })?;
    client
        .import_token_set(token_set)
        .await
        .context("saved token set is unusable")?;
    if client.state() == AuthState::Expired {
        warn!(profile, "saved access token has expired; run `xero-connect refresh`");
    }
    Ok(())
}

/// Persist whatever token-set the client holds, even when a later step failed.
async fn save(client: &XeroClient, store: &TokenStore, profile: &str) -> Result<()> {
    if let Some(token_set) = client.export_token_set() {
        let expires_at = token_set.expires_at;
        store
            .put(profile, token_set)
            .await
            .context("failed to save token set")?;
        info!(profile, expires_at, "token set saved");
    }
    Ok(())
}

fn print_tenants(client: &XeroClient) {
    if client.connections().is_empty() {
        println!("No tenants connected.");
        return;
    }
    for connection in client.connections() {
        println!(
            "{}\t{}\t{}",
            connection.tenant_id,
            connection.tenant_type.as_deref().unwrap_or("-"),
            connection.tenant_name.as_deref().unwrap_or("-"),
        );
    }
}
