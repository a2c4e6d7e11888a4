use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BleachError, Result};
use crate::types::TokenResponse;

/// Bearer credentials for one account.
///
/// Expiry is not tracked: an expired token is detected by the platform
/// answering `Unauthorized`, which triggers a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub obtained_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            obtained_at: Utc::now(),
        }
    }

    /// Build credentials from a token endpoint response. The platform may
    /// omit the refresh token on refresh; keep the previous one then.
    pub fn from_token_response(resp: TokenResponse, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(previous_refresh),
            obtained_at: Utc::now(),
        }
    }

    /// Read `TWITTER_ACCESS_TOKEN` / `TWITTER_REFRESH_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let access = std::env::var("TWITTER_ACCESS_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())?;
        let refresh = std::env::var("TWITTER_REFRESH_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty());
        Some(Self::new(access, refresh))
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Persists [`Credentials`] as JSON so a login survives across runs.
///
/// The default location is `~/.bleach/session.json`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(crate::paths::default_session_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored credentials, or `None` if nothing has been saved.
    pub fn load(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(None);
        }
        let creds: Credentials = serde_json::from_str(&data)?;
        Ok(Some(creds))
    }

    pub fn save(&self, creds: &Credentials) -> Result<()> {
        let data = serde_json::to_string_pretty(creds)?;
        crate::io::atomic_write(&self.path, data.as_bytes())
    }

    /// Delete the stored session (no-op if none exists).
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Load, failing with [`BleachError::NoCredentials`] when empty.
    pub fn require(&self) -> Result<Credentials> {
        self.load()?.ok_or(BleachError::NoCredentials)
    }
}
