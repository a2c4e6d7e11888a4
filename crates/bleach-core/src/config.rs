use crate::bulk::{LoopPolicy, MAX_UNAVAILABLE_IN_A_ROW, RATE_LIMIT_WAIT, UNAVAILABLE_WAIT};
use crate::client::DEFAULT_BASE_URL;
use crate::error::Result;
use crate::oauth::{OAuthApp, DEFAULT_AUTHORIZE_URL, DEFAULT_TOKEN_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_authorize_url() -> String {
    DEFAULT_AUTHORIZE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            timeout_secs: default_timeout_secs(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The registered app, when a client id is known.
    pub fn oauth_app(&self) -> Option<OAuthApp> {
        let client_id = self.client_id.as_ref().filter(|id| !id.trim().is_empty())?;
        Some(OAuthApp {
            client_id: client_id.clone(),
            client_secret: self.client_secret.clone().filter(|s| !s.is_empty()),
            authorize_url: self.authorize_url.clone(),
            token_url: self.token_url.clone(),
        })
    }

    /// Apply `TWITTER_CLIENT_ID` / `TWITTER_CLIENT_SECRET` over the file.
    pub fn apply_env(&mut self) {
        if let Some(id) = env_non_empty("TWITTER_CLIENT_ID") {
            self.client_id = Some(id);
        }
        if let Some(secret) = env_non_empty("TWITTER_CLIENT_SECRET") {
            self.client_secret = Some(secret);
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// OperationsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Follows,
    Likes,
    Tweets,
    Lists,
}

impl OperationKind {
    /// Execution order.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Follows,
        OperationKind::Likes,
        OperationKind::Tweets,
        OperationKind::Lists,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Follows => "follows",
            OperationKind::Likes => "likes",
            OperationKind::Tweets => "tweets",
            OperationKind::Lists => "lists",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LikesConfig {
    #[serde(flatten)]
    pub op: OperationConfig,
    /// Like each post again before unliking it.
    #[serde(default)]
    pub relike: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationsConfig {
    #[serde(default)]
    pub follows: OperationConfig,
    #[serde(default)]
    pub likes: LikesConfig,
    #[serde(default)]
    pub tweets: OperationConfig,
    #[serde(default)]
    pub lists: OperationConfig,
}

impl OperationsConfig {
    pub fn get(&self, kind: OperationKind) -> &OperationConfig {
        match kind {
            OperationKind::Follows => &self.follows,
            OperationKind::Likes => &self.likes.op,
            OperationKind::Tweets => &self.tweets,
            OperationKind::Lists => &self.lists,
        }
    }

    pub fn get_mut(&mut self, kind: OperationKind) -> &mut OperationConfig {
        match kind {
            OperationKind::Follows => &mut self.follows,
            OperationKind::Likes => &mut self.likes.op,
            OperationKind::Tweets => &mut self.tweets,
            OperationKind::Lists => &mut self.lists,
        }
    }

    pub fn enabled(&self) -> Vec<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .filter(|k| self.get(*k).enabled)
            .collect()
    }

    /// Enable exactly `selected`, disabling everything else. An empty
    /// selection leaves the file's choice alone.
    pub fn select_only(&mut self, selected: &[OperationKind]) {
        if selected.is_empty() {
            return;
        }
        for kind in OperationKind::ALL {
            self.get_mut(kind).enabled = selected.contains(&kind);
        }
    }

    /// Override every operation's limit.
    pub fn set_limit(&mut self, limit: u64) {
        for kind in OperationKind::ALL {
            self.get_mut(kind).limit = Some(limit);
        }
    }
}

// ---------------------------------------------------------------------------
// ArchiveConfig / TimingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory receiving `<operation>.csv`. Absent disables archival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,
    #[serde(default = "default_unavailable_wait")]
    pub unavailable_wait_secs: u64,
    #[serde(default = "default_max_unavailable")]
    pub max_unavailable: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_malformed: Option<u32>,
}

fn default_rate_limit_wait() -> u64 {
    RATE_LIMIT_WAIT.as_secs()
}

fn default_unavailable_wait() -> u64 {
    UNAVAILABLE_WAIT.as_secs()
}

fn default_max_unavailable() -> u32 {
    MAX_UNAVAILABLE_IN_A_ROW
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            rate_limit_wait_secs: default_rate_limit_wait(),
            unavailable_wait_secs: default_unavailable_wait(),
            max_unavailable: default_max_unavailable(),
            max_malformed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub dry_run: bool,
}

impl Config {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Loop settings for one operation.
    pub fn policy_for(&self, kind: OperationKind) -> LoopPolicy {
        LoopPolicy {
            limit: self.operations.get(kind).limit,
            dry_run: self.dry_run,
            rate_limit_wait: Duration::from_secs(self.timing.rate_limit_wait_secs),
            unavailable_wait: Duration::from_secs(self.timing.unavailable_wait_secs),
            max_unavailable: self.timing.max_unavailable,
            max_malformed: self.timing.max_malformed,
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.operations.enabled().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no operations enabled; a run will do nothing".to_string(),
            });
        }

        for kind in OperationKind::ALL {
            let op = self.operations.get(kind);
            if op.enabled && op.limit == Some(0) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "operations.{kind}.limit is 0; the loop still acts on one item"
                    ),
                });
            }
        }

        if self.operations.likes.relike && !self.operations.likes.op.enabled {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "operations.likes.relike is set but likes are disabled".to_string(),
            });
        }

        if self.timing.max_unavailable == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timing.max_unavailable must be at least 1".to_string(),
            });
        }

        if self.timing.max_malformed == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "timing.max_malformed must be at least 1 when set".to_string(),
            });
        }

        if self.api.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "api.timeout_secs must be greater than 0".to_string(),
            });
        }

        for (field, value) in [
            ("api.base_url", &self.api.base_url),
            ("api.authorize_url", &self.api.authorize_url),
            ("api.token_url", &self.api.token_url),
        ] {
            if reqwest::Url::parse(value).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{field} is not a valid URL: '{value}'"),
                });
            }
        }

        if self.api.client_secret.is_some() && self.api.client_id.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "api.client_secret is set without api.client_id".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
