use crate::error::ConfigError;
use std::env;

pub const DEFAULT_API_URL: &str = "https://api.twitter.com";

/// One of the two credential shapes the upstream accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// App-only bearer token used as-is.
    Bearer(String),
    /// App key/secret pair, exchanged once for an app-only bearer token.
    AppKey { key: String, secret: String },
}

/// Runtime configuration for the upstream client.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - TWITTER_BEARER_TOKEN, or TWITTER_API_KEY + TWITTER_API_SECRET [one shape required]
    /// - TWITTER_API_URL (default: https://api.twitter.com)
    /// - TWITTER_HTTP_TIMEOUT_SECS (default: 30)
    /// - TWITTER_USER_AGENT (default: twitter-read-mcp/<version>)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = match (
            var("TWITTER_BEARER_TOKEN"),
            var("TWITTER_API_KEY"),
            var("TWITTER_API_SECRET"),
        ) {
            (Some(token), _, _) => Credentials::Bearer(token),
            (None, Some(key), Some(secret)) => Credentials::AppKey { key, secret },
            _ => return Err(ConfigError::MissingCredentials),
        };

        let api_url = var("TWITTER_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        url::Url::parse(&api_url).map_err(|e| ConfigError::InvalidApiUrl {
            url: api_url.clone(),
            reason: e.to_string(),
        })?;
        let api_url = api_url.trim_end_matches('/').to_string();

        let timeout_secs = var("TWITTER_HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);
        let user_agent = var("TWITTER_USER_AGENT")
            .unwrap_or_else(|| format!("twitter-read-mcp/{}", env!("CARGO_PKG_VERSION")));

        Ok(Self {
            credentials,
            api_url,
            user_agent,
            timeout_secs,
        })
    }
}
