//! Rate-limited tool dispatcher.
//!
//! Every call passes through the same sequence: make sure the upstream source exists,
//! check the quota, route the typed call, record it if the upstream was reached, and
//! answer with an envelope that always carries the remaining quota.

use crate::config::Config;
use crate::error::{ConfigError, ToolError, UpstreamError};
use crate::quota::QuotaTracker;
use crate::tools::{
    summarize_all, summarize_replies, EngagementRecord, MentionsOutput, RepliesOutput,
    SearchOutput, ToolCall, ToolOutput,
};
use crate::twitter::{TweetSource, TwitterClient};
use crate::types::RateMeta;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub type SharedSource = Arc<dyn TweetSource>;
type Connector = Box<dyn Fn() -> Result<SharedSource, ConfigError> + Send + Sync>;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "upstreamRate", skip_serializing_if = "Option::is_none")]
    pub upstream_rate: Option<RateMeta>,
    #[serde(rename = "requestsRemaining")]
    pub requests_remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Success {
        output: ToolOutput,
        requests_remaining: usize,
    },
    Error(ErrorEnvelope),
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    #[serde(flatten)]
    output: &'a ToolOutput,
    #[serde(rename = "requestsRemaining")]
    requests_remaining: usize,
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error(_))
    }

    pub fn requests_remaining(&self) -> usize {
        match self {
            Envelope::Success {
                requests_remaining, ..
            } => *requests_remaining,
            Envelope::Error(e) => e.requests_remaining,
        }
    }

    pub fn to_value(&self) -> Value {
        let v = match self {
            Envelope::Success {
                output,
                requests_remaining,
            } => serde_json::to_value(SuccessBody {
                output,
                requests_remaining: *requests_remaining,
            }),
            Envelope::Error(e) => serde_json::to_value(e),
        };
        v.unwrap_or_else(|_| serde_json::json!({}))
    }

    fn from_error(err: &ToolError, quota: &QuotaTracker, requests_remaining: usize) -> Self {
        let (error, message, upstream_rate) = match err {
            ToolError::RateLimited => (
                err.to_string(),
                Some(format!(
                    "Maximum {} requests per {} minutes. Please try again later.",
                    quota.limit(),
                    quota.window().as_secs() / 60
                )),
                None,
            ),
            ToolError::Upstream(e) => (err.to_string(), None, e.rate.clone()),
            _ => (err.to_string(), None, None),
        };
        Envelope::Error(ErrorEnvelope {
            error,
            message,
            code: err.code().map(str::to_string),
            upstream_rate,
            requests_remaining,
        })
    }
}

pub struct Dispatcher {
    source: OnceCell<SharedSource>,
    connect: Connector,
    quota: Mutex<QuotaTracker>,
}

impl Dispatcher {
    /// Dispatcher whose upstream client is built from the environment on first use.
    pub fn from_env() -> Self {
        Self::with_connector(QuotaTracker::default(), || {
            let cfg = Config::from_env()?;
            let client: SharedSource = Arc::new(TwitterClient::new(&cfg)?);
            Ok(client)
        })
    }

    pub fn with_connector<F>(quota: QuotaTracker, connect: F) -> Self
    where
        F: Fn() -> Result<SharedSource, ConfigError> + Send + Sync + 'static,
    {
        Self {
            source: OnceCell::new(),
            connect: Box::new(connect),
            quota: Mutex::new(quota),
        }
    }

    /// Dispatcher over an already-built source.
    pub fn with_source(source: SharedSource, quota: QuotaTracker) -> Self {
        Self {
            source: OnceCell::new_with(Some(source)),
            connect: Box::new(|| Err(ConfigError::MissingCredentials)),
            quota: Mutex::new(quota),
        }
    }

    pub async fn requests_remaining(&self) -> usize {
        self.quota.lock().await.remaining()
    }

    pub async fn dispatch(&self, name: &str, arguments: Value) -> Envelope {
        debug!("dispatch tool={}", name);
        // Held for the whole call so check and record cannot interleave.
        let mut quota = self.quota.lock().await;

        let source = match self.source.get_or_try_init(|| async { (self.connect)() }).await {
            Ok(s) => Arc::clone(s),
            Err(e) => {
                warn!("{}", e);
                let remaining = quota.remaining();
                return Envelope::from_error(&ToolError::Config(e), &quota, remaining);
            }
        };

        if !quota.can_proceed() {
            warn!("local quota exhausted; rejecting {}", name);
            return Envelope::from_error(&ToolError::RateLimited, &quota, 0);
        }

        let result = match ToolCall::parse(name, arguments) {
            Ok(call) => run(source.as_ref(), call).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => {
                quota.record();
                Envelope::Success {
                    output,
                    requests_remaining: quota.remaining(),
                }
            }
            Err(e) => {
                if e.issued_upstream() {
                    quota.record();
                }
                warn!("tool {} failed: {}", name, e);
                let remaining = quota.remaining();
                Envelope::from_error(&e, &quota, remaining)
            }
        }
    }
}

async fn run(source: &dyn TweetSource, call: ToolCall) -> Result<ToolOutput, ToolError> {
    match call {
        ToolCall::GetTweetMetrics { tweet_id } => {
            let tweet = source.tweet(&tweet_id).await?;
            Ok(ToolOutput::TweetMetrics(EngagementRecord::detailed(tweet)))
        }
        ToolCall::GetMentions { page } => {
            // Two upstream reads, one quota record.
            let me = source.me().await?;
            let timeline = source
                .mentions(&me.id, &page)
                .await
                .map_err(UpstreamError::after_issued)?;
            let mentions = summarize_all(timeline);
            Ok(ToolOutput::Mentions(MentionsOutput {
                count: mentions.len(),
                mentions,
            }))
        }
        ToolCall::GetReplies { tweet_id, page } => {
            let replies = summarize_replies(source.conversation(&tweet_id, &page).await?);
            Ok(ToolOutput::Replies(RepliesOutput {
                conversation_id: tweet_id,
                count: replies.len(),
                replies,
            }))
        }
        ToolCall::SearchTweets { query, page } => {
            let tweets = summarize_all(source.search(&query, &page).await?);
            Ok(ToolOutput::Search(SearchOutput {
                count: tweets.len(),
                tweets,
                query,
            }))
        }
    }
}
