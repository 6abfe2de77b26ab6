//! Upstream read API: the four calls the dispatcher needs and a reqwest-backed client.

use crate::config::{Config, Credentials};
use crate::error::{ConfigError, UpstreamError};
use crate::http::{self, ApiProblem};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Fields requested for a single-tweet metrics lookup.
pub const TWEET_METRIC_FIELDS: &str =
    "public_metrics,non_public_metrics,organic_metrics,promoted_metrics,created_at,author_id";
/// Fields requested for timeline and search results.
pub const TIMELINE_FIELDS: &str = "created_at,author_id,public_metrics,conversation_id";
/// Timeline fields plus the reply linkage for conversation lookups.
pub const REPLY_FIELDS: &str =
    "created_at,author_id,public_metrics,conversation_id,referenced_tweets";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicMetrics {
    pub like_count: Option<u64>,
    pub retweet_count: Option<u64>,
    pub reply_count: Option<u64>,
    pub quote_count: Option<u64>,
    pub bookmark_count: Option<u64>,
    pub impression_count: Option<u64>,
}

/// Non-public, organic and promoted metric families share this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrivateMetrics {
    pub impression_count: Option<u64>,
    pub like_count: Option<u64>,
    pub retweet_count: Option<u64>,
    pub reply_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tweet {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub created_at: Option<String>,
    pub author_id: Option<String>,
    pub conversation_id: Option<String>,
    pub public_metrics: Option<PublicMetrics>,
    pub non_public_metrics: Option<PrivateMetrics>,
    pub organic_metrics: Option<PrivateMetrics>,
    pub promoted_metrics: Option<PrivateMetrics>,
    pub referenced_tweets: Option<Vec<ReferencedTweet>>,
}

impl Tweet {
    /// Id of the tweet this one answers, when the upstream returned the linkage.
    pub fn replied_to(&self) -> Option<&str> {
        self.referenced_tweets
            .as_deref()?
            .iter()
            .find(|r| r.kind == "replied_to")
            .map(|r| r.id.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub name: Option<String>,
}

/// Optional lower bound and page size shared by mention timeline and search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageParams {
    pub max_results: u32,
    pub start_time: Option<String>,
}

/// The slice of the upstream read API the dispatcher consumes.
#[async_trait]
pub trait TweetSource: Send + Sync {
    /// Single tweet by id, with all metric families requested.
    async fn tweet(&self, id: &str) -> Result<Tweet, UpstreamError>;
    /// The authenticated identity.
    async fn me(&self) -> Result<User, UpstreamError>;
    async fn mentions(&self, user_id: &str, page: &PageParams) -> Result<Vec<Tweet>, UpstreamError>;
    async fn search(&self, query: &str, page: &PageParams) -> Result<Vec<Tweet>, UpstreamError>;
    /// Recent tweets in a conversation, with reply references.
    async fn conversation(
        &self,
        conversation_id: &str,
        page: &PageParams,
    ) -> Result<Vec<Tweet>, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<ApiProblem>,
}

impl<T> ApiResponse<T> {
    // A 200 with only `errors` (e.g. unknown id) is still a failure.
    fn into_required(self, what: &str) -> Result<T, UpstreamError> {
        match (self.data, self.errors.first()) {
            (Some(data), _) => Ok(data),
            (None, Some(problem)) => Err(UpstreamError::new(problem.code(), problem.describe())),
            (None, None) => Err(UpstreamError::new(
                "not_found",
                format!("{} not found in upstream response", what),
            )),
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    // Empty timelines come back without `data`; that is not an error.
    fn into_list(self) -> Result<Vec<T>, UpstreamError> {
        match (self.data, self.errors.first()) {
            (Some(items), _) => Ok(items),
            (None, Some(problem)) => Err(UpstreamError::new(problem.code(), problem.describe())),
            (None, None) => Ok(Vec::new()),
        }
    }
}

/// reqwest-backed upstream client. Cheap to share behind an `Arc`.
pub struct TwitterClient {
    client: Client,
    api_url: String,
    credentials: Credentials,
    token: OnceCell<String>,
}

impl TwitterClient {
    pub fn new(cfg: &Config) -> Result<Self, ConfigError> {
        let client = http::build_client(cfg)?;
        Ok(Self {
            client,
            api_url: cfg.api_url.clone(),
            credentials: cfg.credentials.clone(),
            token: OnceCell::new(),
        })
    }

    /// Bearer token for API calls; the app key/secret exchange happens once.
    async fn bearer(&self) -> Result<&str, UpstreamError> {
        let token = self
            .token
            .get_or_try_init(|| async {
                match &self.credentials {
                    Credentials::Bearer(t) => Ok::<_, UpstreamError>(t.clone()),
                    Credentials::AppKey { key, secret } => {
                        let t =
                            http::exchange_app_token(&self.client, &self.api_url, key, secret)
                                .await?;
                        info!("Obtained app-only bearer token from key/secret");
                        Ok(t)
                    }
                }
            })
            .await?;
        Ok(token.as_str())
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, UpstreamError> {
        let exchanging = !self.token.initialized()
            && matches!(self.credentials, Credentials::AppKey { .. });
        let token = self.bearer().await?;
        let url = format!("{}{}", self.api_url, path);
        // A token exchange made for this request already reached the upstream.
        http::get_json(&self.client, &url, token, query)
            .await
            .map_err(|e| if exchanging { e.after_issued() } else { e })
    }

    async fn recent_search(
        &self,
        query: &str,
        fields: &str,
        page: &PageParams,
    ) -> Result<Vec<Tweet>, UpstreamError> {
        let mut q = page_query(fields, page);
        q.insert(0, ("query", query.to_string()));
        let resp: ApiResponse<Vec<Tweet>> = self.get("/2/tweets/search/recent", &q).await?;
        let tweets = resp.into_list()?;
        debug!("search returned {} tweets", tweets.len());
        Ok(tweets)
    }
}

fn page_query(fields: &str, page: &PageParams) -> Vec<(&'static str, String)> {
    let mut q = vec![
        ("tweet.fields", fields.to_string()),
        ("max_results", page.max_results.to_string()),
    ];
    if let Some(start) = &page.start_time {
        q.push(("start_time", start.clone()));
    }
    q
}

#[async_trait]
impl TweetSource for TwitterClient {
    async fn tweet(&self, id: &str) -> Result<Tweet, UpstreamError> {
        let path = format!("/2/tweets/{}", urlencoding::encode(id));
        let resp: ApiResponse<Tweet> = self
            .get(&path, &[("tweet.fields", TWEET_METRIC_FIELDS.to_string())])
            .await?;
        resp.into_required("Tweet")
    }

    async fn me(&self) -> Result<User, UpstreamError> {
        let resp: ApiResponse<User> = self
            .get("/2/users/me", &[("user.fields", "username,name".to_string())])
            .await?;
        resp.into_required("User")
    }

    async fn mentions(&self, user_id: &str, page: &PageParams) -> Result<Vec<Tweet>, UpstreamError> {
        let path = format!("/2/users/{}/mentions", urlencoding::encode(user_id));
        let resp: ApiResponse<Vec<Tweet>> = self.get(&path, &page_query(TIMELINE_FIELDS, page)).await?;
        let tweets = resp.into_list()?;
        debug!("mention timeline returned {} tweets", tweets.len());
        Ok(tweets)
    }

    async fn search(&self, query: &str, page: &PageParams) -> Result<Vec<Tweet>, UpstreamError> {
        self.recent_search(query, TIMELINE_FIELDS, page).await
    }

    async fn conversation(
        &self,
        conversation_id: &str,
        page: &PageParams,
    ) -> Result<Vec<Tweet>, UpstreamError> {
        let query = format!("conversation_id:{}", conversation_id);
        self.recent_search(&query, REPLY_FIELDS, page).await
    }
}
