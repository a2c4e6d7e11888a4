use std::time::Duration;

use thiserror::Error;

/// Classification of every response the platform API can give us.
///
/// The bulk loop never looks at status codes; it only switches on these
/// variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("unauthorized: access token rejected")]
    Unauthorized,

    #[error("service unavailable{}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    ServiceUnavailable { status: Option<u16> },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("api error{}: {message}", status.map(|s| format!(" {s}")).unwrap_or_default())]
    Other {
        status: Option<u16>,
        message: String,
    },
}

impl ApiError {
    pub fn other(message: impl Into<String>) -> Self {
        ApiError::Other {
            status: None,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ApiError::ServiceUnavailable {
                status: e.status().map(|s| s.as_u16()),
            }
        } else if e.is_decode() {
            ApiError::Malformed(e.to_string())
        } else {
            ApiError::Other {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum BleachError {
    #[error("no credentials: run 'bleach login' or set TWITTER_ACCESS_TOKEN")]
    NoCredentials,

    #[error("credential refresh unavailable: {0}")]
    RefreshUnavailable(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("oauth state mismatch: expected '{expected}', got '{actual}'")]
    StateMismatch { expected: String, actual: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error("archive write failed for {operation}: {source}")]
    Archive {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BleachError>;
