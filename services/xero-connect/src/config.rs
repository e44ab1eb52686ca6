//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from XERO_CLIENT_SECRET or client_secret_file,
//! never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use xero_auth::{ClientConfig, Endpoints};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub xero: XeroConfig,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
    #[serde(default)]
    pub session: SessionConfig,
}

/// App registration in the Xero developer portal
#[derive(Debug, Deserialize)]
pub struct XeroConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to XERO_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub use_pkce: bool,
}

/// Overrides for sandboxes and local testing. Unset fields use production.
#[derive(Debug, Default, Deserialize)]
pub struct EndpointOverrides {
    pub issuer: Option<String>,
    pub connections_url: Option<String>,
    pub accounting_base_url: Option<String>,
}

/// Where token-sets are kept between runs
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            profile: default_profile(),
            callback_timeout_secs: default_callback_timeout(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("xero-tokens.json")
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_callback_timeout() -> u64 {
    300
}

fn require_http(field: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. XERO_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.xero.client_id.trim().is_empty() {
            return Err(common::Error::Config("xero.client_id must not be empty".into()));
        }

        if config.xero.redirect_uris.is_empty() {
            return Err(common::Error::Config(
                "xero.redirect_uris must contain at least one URI".into(),
            ));
        }
        for uri in &config.xero.redirect_uris {
            require_http("redirect_uris entry", uri)?;
        }

        let overrides = [
            ("endpoints.issuer", &config.endpoints.issuer),
            ("endpoints.connections_url", &config.endpoints.connections_url),
            ("endpoints.accounting_base_url", &config.endpoints.accounting_base_url),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                require_http(field, value)?;
            }
        }

        if config.session.callback_timeout_secs == 0 {
            return Err(common::Error::Config(
                "callback_timeout_secs must be greater than 0".into(),
            ));
        }

        // Resolve client secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("XERO_CLIENT_SECRET") {
            config.xero.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.xero.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.xero.client_secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or XERO_CONNECT_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("XERO_CONNECT_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("xero-connect.toml")
    }

    /// Client configuration with endpoint overrides applied.
    pub fn client_config(&self) -> common::Result<ClientConfig> {
        let secret = self
            .xero
            .client_secret
            .as_ref()
            .filter(|s| !s.is_blank())
            .ok_or_else(|| {
                common::Error::Config(
                    "client secret missing: set XERO_CLIENT_SECRET or xero.client_secret_file"
                        .into(),
                )
            })?;

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            issuer: self.endpoints.issuer.clone().unwrap_or(defaults.issuer),
            connections_url: self
                .endpoints
                .connections_url
                .clone()
                .unwrap_or(defaults.connections_url),
            accounting_base_url: self
                .endpoints
                .accounting_base_url
                .clone()
                .unwrap_or(defaults.accounting_base_url),
        };

        let config = ClientConfig::new(
            self.xero.client_id.clone(),
            secret.expose().clone(),
            self.xero.redirect_uris.clone(),
        )
        .map_err(|e| common::Error::Config(e.to_string()))?
        .with_scopes(self.xero.scopes.iter().cloned())
        .with_pkce(self.xero.use_pkce)
        .with_endpoints(endpoints);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[xero]
client_id = "client-abc"
redirect_uris = ["http://localhost:5000/callback", "https://app.example.com/callback"]
scopes = ["openid", "profile", "email", "accounting.transactions", "offline_access"]
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { remove_env("XERO_CLIENT_SECRET") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.xero.client_id, "client-abc");
        assert_eq!(config.xero.redirect_uris.len(), 2);
        assert_eq!(config.xero.scopes.len(), 5);
        assert!(!config.xero.use_pkce);
        assert!(config.xero.client_secret.is_none());
        assert_eq!(config.session.profile, "default");
        assert_eq!(config.session.callback_timeout_secs, 300);
        assert_eq!(config.session.store_path, PathBuf::from("xero-tokens.json"));
        assert!(config.endpoints.issuer.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_empty_redirect_uris_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[xero]
client_id = "client-abc"
redirect_uris = []
"#,
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("redirect_uris"), "got: {err}");
    }

    #[test]
    fn test_non_http_redirect_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[xero]
client_id = "client-abc"
redirect_uris = ["myapp://callback"]
"#,
        );
        assert!(matches!(Config::load(&path), Err(common::Error::Config(_))));
    }

    #[test]
    fn test_non_http_endpoint_override_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!("{}\n[endpoints]\nconnections_url = \"ftp://example.com\"\n", valid_toml()),
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("connections_url"), "got: {err}");
    }

    #[test]
    fn test_zero_callback_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!("{}\n[session]\ncallback_timeout_secs = 0\n", valid_toml()),
        );
        assert!(matches!(Config::load(&path), Err(common::Error::Config(_))));
    }

    #[test]
    fn test_secret_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("XERO_CLIENT_SECRET", "env-secret-123") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.xero.client_secret.as_ref().unwrap().expose(),
            "env-secret-123"
        );
        unsafe { remove_env("XERO_CLIENT_SECRET") };
    }

    #[test]
    fn test_secret_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "file-secret-456\n").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[xero]
client_id = "client-abc"
client_secret_file = "{}"
redirect_uris = ["https://app.example.com/callback"]
"#,
                secret_path.display()
            ),
        );

        unsafe { remove_env("XERO_CLIENT_SECRET") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.xero.client_secret.as_ref().unwrap().expose(),
            "file-secret-456"
        );
    }

    #[test]
    fn test_secret_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "file-secret").unwrap();
        let path = write_config(
            &dir,
            &format!(
                r#"
[xero]
client_id = "client-abc"
client_secret_file = "{}"
redirect_uris = ["https://app.example.com/callback"]
"#,
                secret_path.display()
            ),
        );

        unsafe { set_env("XERO_CLIENT_SECRET", "env-secret") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.xero.client_secret.as_ref().unwrap().expose(), "env-secret");
        unsafe { remove_env("XERO_CLIENT_SECRET") };
    }

    #[test]
    fn test_client_config_requires_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { remove_env("XERO_CLIENT_SECRET") };
        let config = Config::load(&path).unwrap();
        let err = config.client_config().unwrap_err();
        assert!(err.to_string().contains("XERO_CLIENT_SECRET"), "got: {err}");
    }

    #[test]
    fn test_client_config_applies_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &format!(
                "{}\nuse_pkce = true\n\n[endpoints]\nconnections_url = \"http://127.0.0.1:9000/connections\"\n",
                valid_toml()
            ),
        );

        unsafe { set_env("XERO_CLIENT_SECRET", "s3cret") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("XERO_CLIENT_SECRET") };

        let client = config.client_config().unwrap();
        assert_eq!(client.client_id, "client-abc");
        assert_eq!(client.client_secret.expose(), "s3cret");
        assert!(client.use_pkce);
        assert_eq!(client.primary_redirect_uri(), "http://localhost:5000/callback");
        assert_eq!(
            client.endpoints.connections_url,
            "http://127.0.0.1:9000/connections"
        );
        assert_eq!(client.endpoints.issuer, xero_auth::ISSUER);
        assert_eq!(
            client.scope_param(),
            "openid profile email accounting.transactions offline_access"
        );
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("XERO_CONNECT_CONFIG", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("XERO_CONNECT_CONFIG") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("XERO_CONNECT_CONFIG") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("xero-connect.toml"));
    }
}
