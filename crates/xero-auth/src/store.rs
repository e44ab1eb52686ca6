//! File-backed datastore for exported token-sets
//!
//! Maps a profile name to the `TokenSet` exported from a client, so a later
//! process can import it instead of running consent again. Writes go through
//! a temp file + rename and the file is kept at 0600 because it holds
//! bearer and refresh tokens. A tokio Mutex serializes writers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::TokenSet;

pub struct TokenStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, TokenSet>>,
}

impl TokenStore {
    /// Load the store from `path`, creating it as `{}` when missing.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token store: {e}")))?;
            let sets: BTreeMap<String, TokenSet> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing token store: {e}")))?;
            info!(path = %path.display(), profiles = sets.len(), "loaded token store");
            sets
        } else {
            info!(path = %path.display(), "token store not found, starting empty");
            let sets = BTreeMap::new();
            write_atomic(&path, &sets).await?;
            sets
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, profile: &str) -> Option<TokenSet> {
        let state = self.state.lock().await;
        state.get(profile).cloned()
    }

    /// Profile names in sorted order.
    pub async fn profiles(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.keys().cloned().collect()
    }

    /// Insert or replace the token-set for `profile` and persist.
    pub async fn put(&self, profile: &str, token_set: TokenSet) -> Result<()> {
        let mut state = self.state.lock().await;
        state.insert(profile.to_string(), token_set);
        debug!(profile, "stored token set");
        write_atomic(&self.path, &state).await
    }

    /// Remove a profile and persist. Returns the removed token-set, if any.
    pub async fn remove(&self, profile: &str) -> Result<Option<TokenSet>> {
        let mut state = self.state.lock().await;
        let removed = state.remove(profile);
        if removed.is_some() {
            debug!(profile, "removed token set");
            write_atomic(&self.path, &state).await?;
        }
        Ok(removed)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn write_atomic(path: &Path, data: &BTreeMap<String, TokenSet>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing token store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token store: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token store permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token store: {e}")))?;

    debug!(path = %path.display(), "persisted token store");
    Ok(())
}
