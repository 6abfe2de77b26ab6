use crate::config::Config;
use crate::error::{ConfigError, UpstreamError};
use crate::types::RateMeta;
use base64::Engine; // for STANDARD.encode
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Problem object returned by the v2 API, either top-level (non-2xx) or inside `errors`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiProblem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default, rename = "type")]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiProblem {
    pub fn describe(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "Unknown upstream error".to_string())
    }

    /// Maps problem type URIs (e.g. `.../problems/resource-not-found`) onto error codes.
    pub fn code(&self) -> &'static str {
        let kind = self
            .problem_type
            .as_deref()
            .and_then(|t| t.rsplit('/').next())
            .unwrap_or("");
        match kind {
            "resource-not-found" => "not_found",
            "not-authorized-for-resource" | "client-forbidden" => "forbidden",
            "invalid-request" => "bad_request",
            "usage-capped" => "rate_limited",
            _ => "upstream_error",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProblemBody {
    #[serde(default)]
    errors: Option<Vec<ApiProblem>>,
    #[serde(flatten)]
    top: ApiProblem,
}

pub fn build_client(cfg: &Config) -> Result<Client, ConfigError> {
    let mut default_headers = HeaderMap::new();
    let ua = HeaderValue::from_str(&cfg.user_agent)
        .map_err(|e| ConfigError::Client(format!("invalid user agent: {}", e)))?;
    default_headers.insert(USER_AGENT, ua);
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

fn auth_header(token: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| UpstreamError::not_issued("config_error", "Bearer token is not a valid header value"))
}

pub fn map_status_to_error(status: StatusCode, message: String) -> UpstreamError {
    let code = match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::TOO_MANY_REQUESTS => "rate_limited",
        s if s.is_server_error() => "upstream_error",
        _ => "server_error",
    };
    UpstreamError::new(code, message)
}

// Transport failures before a connection is made never reached the upstream.
fn map_transport_error(e: reqwest::Error) -> UpstreamError {
    let message = if e.is_timeout() {
        format!("Upstream request timed out: {}", e)
    } else {
        format!("Upstream request failed: {}", e)
    };
    if e.is_connect() || e.is_builder() {
        UpstreamError::not_issued("network_error", message)
    } else {
        UpstreamError::new("network_error", message)
    }
}

pub fn extract_rate_from_headers(headers: &HeaderMap) -> RateMeta {
    let num = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i32>().ok())
    };
    let reset_at = headers
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|epoch| chrono::DateTime::<chrono::Utc>::from_timestamp(epoch, 0))
        .map(|dt| dt.to_rfc3339());
    RateMeta {
        remaining: num("x-rate-limit-remaining"),
        limit: num("x-rate-limit-limit"),
        reset_at,
    }
}

/// Pull a human-readable message out of an error body, falling back to the raw text.
pub fn error_message_from_body(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ProblemBody>(body) {
        Ok(p) => match p.errors.as_ref().and_then(|e| e.first()) {
            Some(first) => first.describe(),
            None => p.top.describe(),
        },
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("Upstream error")
            .to_string(),
        Err(_) => body.to_string(),
    }
}

/// Single GET against the upstream; no retries.
pub async fn get_json<T: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    token: &str,
    query: &[(&str, String)],
) -> Result<T, UpstreamError> {
    let res = client
        .get(url)
        .header(AUTHORIZATION, auth_header(token)?)
        .query(query)
        .send()
        .await
        .map_err(|e| {
            warn!("GET {} failed to send: {}", url, e);
            map_transport_error(e)
        })?;

    let status = res.status();
    let rate = extract_rate_from_headers(res.headers());
    debug!(
        "GET {} -> {} (upstream remaining={:?}, reset_at={:?})",
        url, status, rate.remaining, rate.reset_at
    );

    if status.is_success() {
        return res.json::<T>().await.map_err(|e| {
            UpstreamError::new("server_error", format!("Malformed upstream response: {}", e))
        });
    }

    let text = res.text().await.unwrap_or_default();
    let mut err = map_status_to_error(status, error_message_from_body(status, &text));
    if status == StatusCode::TOO_MANY_REQUESTS {
        err.rate = Some(rate);
    }
    warn!("GET {} failed: {} ({})", url, err.message, status);
    Err(err)
}

/// `base64(urlencode(key) ":" urlencode(secret))` as required by the token endpoint.
pub fn encode_basic_credentials(key: &str, secret: &str) -> String {
    let raw = format!(
        "{}:{}",
        urlencoding::encode(key),
        urlencoding::encode(secret)
    );
    base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Exchange an app key/secret pair for an app-only bearer token.
pub async fn exchange_app_token(
    client: &Client,
    api_url: &str,
    key: &str,
    secret: &str,
) -> Result<String, UpstreamError> {
    let url = format!("{}/oauth2/token", api_url);
    let basic = HeaderValue::from_str(&format!("Basic {}", encode_basic_credentials(key, secret)))
        .map_err(|_| UpstreamError::not_issued("config_error", "API key/secret are not valid header values"))?;
    let res = client
        .post(&url)
        .header(AUTHORIZATION, basic)
        .header(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded;charset=UTF-8"),
        )
        .body("grant_type=client_credentials")
        .send()
        .await
        .map_err(map_transport_error)?;

    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(map_status_to_error(
            status,
            format!("App token exchange failed: {}", error_message_from_body(status, &text)),
        ));
    }
    let token: TokenResponse = res.json().await.map_err(|e| {
        UpstreamError::new("server_error", format!("Malformed token response: {}", e))
    })?;
    if !token.token_type.eq_ignore_ascii_case("bearer") {
        return Err(UpstreamError::new(
            "server_error",
            format!("Unexpected token type: {}", token.token_type),
        ));
    }
    Ok(token.access_token)
}
