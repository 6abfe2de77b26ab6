use crate::error::ToolError;
use crate::twitter::{PageParams, Tweet};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const MENTIONS_RESULT_BOUNDS: (u32, u32) = (5, 100);
pub const SEARCH_RESULT_BOUNDS: (u32, u32) = (10, 100);

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    let get_tweet_metrics = ToolDescriptor {
        name: "get_tweet_metrics".into(),
        description: "Get engagement metrics for a specific tweet including likes, retweets, replies, and impressions".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "tweet_id": {"type": "string", "description": "The ID of the tweet to fetch metrics for"}
            },
            "required": ["tweet_id"]
        }),
    };

    let get_mentions = ToolDescriptor {
        name: "get_mentions".into(),
        description: "Get recent @mentions of the authenticated account".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "since_date": {
                    "type": "string",
                    "description": "ISO 8601 date string (e.g., 2026-01-20T00:00:00Z). Only tweets after this date will be returned."
                },
                "max_results": {
                    "type": "number",
                    "description": "Maximum number of mentions to return (5-100, default: 10)",
                    "default": DEFAULT_MAX_RESULTS
                }
            }
        }),
    };

    let get_replies = ToolDescriptor {
        name: "get_replies".into(),
        description: "Get tweets in the conversation thread started by a tweet. Results are thread-scoped: they include every tweet sharing the conversation, not only direct replies.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "tweet_id": {"type": "string", "description": "The ID of the tweet whose conversation to fetch"},
                "max_results": {
                    "type": "number",
                    "description": "Maximum number of tweets to return (10-100, default: 10)",
                    "default": DEFAULT_MAX_RESULTS
                }
            },
            "required": ["tweet_id"]
        }),
    };

    let search_tweets = ToolDescriptor {
        name: "search_tweets".into(),
        description: "Search for tweets matching a query and return results with engagement metrics".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query string (supports Twitter search operators)"},
                "max_results": {
                    "type": "number",
                    "description": "Maximum number of tweets to return (10-100, default: 10)",
                    "default": DEFAULT_MAX_RESULTS
                },
                "start_time": {
                    "type": "string",
                    "description": "ISO 8601 date string for earliest tweet (e.g., 2026-01-20T00:00:00Z)"
                }
            },
            "required": ["query"]
        }),
    };

    vec![get_tweet_metrics, get_mentions, get_replies, search_tweets]
}

// Tool inputs as they arrive on the wire.
#[derive(Debug, Deserialize)]
pub struct GetTweetMetricsInput {
    pub tweet_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct GetMentionsInput {
    pub since_date: Option<String>,
    #[serde(default, deserialize_with = "loose_number")]
    pub max_results: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct GetRepliesInput {
    pub tweet_id: String,
    #[serde(default, deserialize_with = "loose_number")]
    pub max_results: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchTweetsInput {
    pub query: String,
    #[serde(default, deserialize_with = "loose_number")]
    pub max_results: Option<f64>,
    pub start_time: Option<String>,
}

/// Hosts sometimes send counts as strings ("20"); blank strings count as absent.
fn loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
    }

    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Number(n)) => Ok(Some(n)),
        Some(Loose::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Loose::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("max_results must be a number, got {:?}", s))),
    }
}

/// A validated invocation; one variant per tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    GetTweetMetrics { tweet_id: String },
    GetMentions { page: PageParams },
    GetReplies { tweet_id: String, page: PageParams },
    SearchTweets { query: String, page: PageParams },
}

impl ToolCall {
    pub fn parse(name: &str, arguments: Value) -> Result<Self, ToolError> {
        // Absent arguments behave like an empty object.
        let arguments = if arguments.is_null() {
            Value::Object(Default::default())
        } else {
            arguments
        };
        match name {
            "get_tweet_metrics" => {
                let input: GetTweetMetricsInput = parse_input(arguments)?;
                Ok(ToolCall::GetTweetMetrics {
                    tweet_id: input.tweet_id,
                })
            }
            "get_mentions" => {
                let input: GetMentionsInput = parse_input(arguments)?;
                Ok(ToolCall::GetMentions {
                    page: PageParams {
                        max_results: clamp_max_results(input.max_results, MENTIONS_RESULT_BOUNDS),
                        start_time: input.since_date,
                    },
                })
            }
            "get_replies" => {
                let input: GetRepliesInput = parse_input(arguments)?;
                Ok(ToolCall::GetReplies {
                    tweet_id: input.tweet_id,
                    page: PageParams {
                        max_results: clamp_max_results(input.max_results, SEARCH_RESULT_BOUNDS),
                        start_time: None,
                    },
                })
            }
            "search_tweets" => {
                let input: SearchTweetsInput = parse_input(arguments)?;
                Ok(ToolCall::SearchTweets {
                    query: input.query,
                    page: PageParams {
                        max_results: clamp_max_results(input.max_results, SEARCH_RESULT_BOUNDS),
                        start_time: input.start_time,
                    },
                })
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GetTweetMetrics { .. } => "get_tweet_metrics",
            ToolCall::GetMentions { .. } => "get_mentions",
            ToolCall::GetReplies { .. } => "get_replies",
            ToolCall::SearchTweets { .. } => "search_tweets",
        }
    }
}

fn parse_input<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::Validation(e.to_string()))
}

/// Missing or non-finite values use the default; fractions are truncated.
pub fn clamp_max_results(requested: Option<f64>, (min, max): (u32, u32)) -> u32 {
    let value = requested
        .filter(|v| v.is_finite())
        .map(|v| v.trunc())
        .unwrap_or(DEFAULT_MAX_RESULTS as f64);
    value.clamp(min as f64, max as f64) as u32
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq, Default)]
pub struct EngagementMetrics {
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub quotes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmarks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impressions: Option<u64>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct EngagementRecord {
    pub tweet_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_tweet_id: Option<String>,
    pub metrics: EngagementMetrics,
}

impl EngagementRecord {
    /// Full record for a single-tweet lookup, including bookmarks and impressions.
    pub fn detailed(tweet: Tweet) -> Self {
        let public = tweet.public_metrics.clone().unwrap_or_default();
        // Different access levels populate different families; first non-zero wins.
        let impressions = [
            public.impression_count,
            tweet.non_public_metrics.as_ref().and_then(|m| m.impression_count),
            tweet.organic_metrics.as_ref().and_then(|m| m.impression_count),
        ]
        .into_iter()
        .flatten()
        .find(|n| *n > 0)
        .unwrap_or(0);

        let mut record = Self::summary(tweet);
        record.metrics.bookmarks = Some(public.bookmark_count.unwrap_or(0));
        record.metrics.impressions = Some(impressions);
        record
    }

    /// Timeline/search record: public counts only.
    pub fn summary(tweet: Tweet) -> Self {
        let public = tweet.public_metrics.unwrap_or_default();
        Self {
            tweet_id: tweet.id,
            text: tweet.text,
            created_at: tweet.created_at,
            author_id: tweet.author_id,
            in_reply_to_tweet_id: None,
            metrics: EngagementMetrics {
                likes: public.like_count.unwrap_or(0),
                retweets: public.retweet_count.unwrap_or(0),
                replies: public.reply_count.unwrap_or(0),
                quotes: public.quote_count.unwrap_or(0),
                bookmarks: None,
                impressions: None,
            },
        }
    }

    /// Conversation record: summary plus the tweet it answers, if any.
    pub fn reply(tweet: Tweet) -> Self {
        let parent = tweet.replied_to().map(str::to_string);
        let mut record = Self::summary(tweet);
        record.in_reply_to_tweet_id = parent;
        record
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MentionsOutput {
    pub mentions: Vec<EngagementRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RepliesOutput {
    pub conversation_id: String,
    pub replies: Vec<EngagementRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct SearchOutput {
    pub tweets: Vec<EngagementRecord>,
    pub count: usize,
    pub query: String,
}

/// Operation-specific success payload, before quota figures are attached.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ToolOutput {
    TweetMetrics(EngagementRecord),
    Mentions(MentionsOutput),
    Replies(RepliesOutput),
    Search(SearchOutput),
}

pub fn summarize_all(tweets: Vec<Tweet>) -> Vec<EngagementRecord> {
    tweets.into_iter().map(EngagementRecord::summary).collect()
}

pub fn summarize_replies(tweets: Vec<Tweet>) -> Vec<EngagementRecord> {
    tweets.into_iter().map(EngagementRecord::reply).collect()
}
