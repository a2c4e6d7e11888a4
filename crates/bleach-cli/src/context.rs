use anyhow::Context;
use bleach_core::paths::CONFIG_FILE;
use bleach_core::{Config, Credentials, HttpClient, SessionStore};
use std::path::{Path, PathBuf};

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag / `BLEACH_CONFIG` env var (passed in as `explicit`)
/// 2. `bleach.yaml` in the current directory
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join(CONFIG_FILE)
}

/// Load the config and apply `TWITTER_CLIENT_ID` / `TWITTER_CLIENT_SECRET`.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.api.apply_env();
    Ok(config)
}

/// `--session` / `BLEACH_SESSION`, else `~/.bleach/session.json`.
pub fn session_store(explicit: Option<&Path>) -> anyhow::Result<SessionStore> {
    match explicit {
        Some(p) => Ok(SessionStore::new(p)),
        None => SessionStore::default_location().context("failed to locate session file"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    Session,
}

/// Environment tokens win over the stored session.
pub fn resolve_credentials(store: &SessionStore) -> anyhow::Result<(Credentials, CredentialSource)> {
    if let Some(creds) = Credentials::from_env() {
        return Ok((creds, CredentialSource::Env));
    }
    let creds = store
        .require()
        .with_context(|| format!("no usable session at {}", store.path().display()))?;
    Ok((creds, CredentialSource::Session))
}

pub fn build_client(config: &Config, creds: Credentials) -> anyhow::Result<HttpClient> {
    let client = HttpClient::new(&config.api.base_url, creds, config.api.timeout())
        .context("failed to build http client")?;
    Ok(match config.api.oauth_app() {
        Some(app) => client.with_oauth(app),
        None => client,
    })
}

/// Write refreshed credentials back to the session they came from.
pub fn persist_refresh(
    client: &HttpClient,
    source: CredentialSource,
    store: &SessionStore,
) -> anyhow::Result<()> {
    if !client.was_refreshed() {
        return Ok(());
    }
    match source {
        CredentialSource::Session => {
            store
                .save(client.credentials())
                .context("failed to save refreshed session")?;
            tracing::info!(path = %store.path().display(), "saved refreshed session");
        }
        CredentialSource::Env => {
            tracing::warn!("access token from environment was refreshed; the new token is not persisted");
        }
    }
    Ok(())
}
