use crate::types::RateMeta;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error(
        "Missing Twitter API credentials. Set TWITTER_BEARER_TOKEN or (TWITTER_API_KEY + TWITTER_API_SECRET)"
    )]
    MissingCredentials,
    #[error("Invalid TWITTER_API_URL {url}: {reason}")]
    InvalidApiUrl { url: String, reason: String },
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Failure reported by the upstream read API or the transport underneath it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
    pub code: Option<String>,
    /// Whether the request reached the upstream (and so counts against quota).
    pub issued: bool,
    pub rate: Option<RateMeta>,
}

impl UpstreamError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.to_string()),
            issued: true,
            rate: None,
        }
    }

    pub fn not_issued(code: &str, message: impl Into<String>) -> Self {
        Self {
            issued: false,
            ..Self::new(code, message)
        }
    }

    /// Count this failure against quota because an earlier call in the same
    /// dispatch already reached the upstream.
    pub fn after_issued(mut self) -> Self {
        self.issued = true;
        self
    }
}

/// Everything a single tool dispatch can fail with.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid params: {0}")]
    Validation(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ToolError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ToolError::Config(_) => Some("config_error"),
            ToolError::RateLimited => Some("rate_limited"),
            ToolError::UnknownTool(_) => Some("unknown_tool"),
            ToolError::Validation(_) => Some("invalid_params"),
            ToolError::Upstream(e) => e.code.as_deref(),
        }
    }

    /// True when an upstream request was actually sent before failing.
    pub fn issued_upstream(&self) -> bool {
        matches!(self, ToolError::Upstream(e) if e.issued)
    }
}
