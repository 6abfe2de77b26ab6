mod common;

use common::{run_with_env, tool_call};
use httpmock::{Method::GET, Method::POST, MockServer};
use serde_json::json;

const METRIC_FIELDS: &str =
    "public_metrics,non_public_metrics,organic_metrics,promoted_metrics,created_at,author_id";
const REPLY_FIELDS: &str = "created_at,author_id,public_metrics,conversation_id,referenced_tweets";

#[test]
fn get_tweet_metrics_defaults_and_counts_quota() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET)
            .path("/2/tweets/123")
            .header("authorization", "Bearer t")
            .query_param("tweet.fields", METRIC_FIELDS);
        then.status(200).json_body(json!({
            "data": {"id": "123", "text": "hi", "public_metrics": {"like_count": 5}}
        }));
    });

    let out = run_with_env(
        &[
            tool_call(1, "get_tweet_metrics", json!({"tweet_id": "123"})),
            tool_call(2, "get_tweet_metrics", json!({"tweet_id": "123"})),
        ],
        &[
            ("TWITTER_BEARER_TOKEN", "t"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    m.assert_hits(2);

    let first = &out[0]["result"];
    assert!(first.get("isError").is_none());
    let sc = &first["structuredContent"];
    assert_eq!(sc["tweet_id"], "123");
    assert_eq!(
        sc["metrics"],
        json!({"likes": 5, "retweets": 0, "replies": 0, "quotes": 0, "bookmarks": 0, "impressions": 0})
    );
    assert_eq!(sc["requestsRemaining"], 499);
    assert!(first["content"][0]["text"].as_str().unwrap().contains("\"likes\": 5"));
    assert_eq!(out[1]["result"]["structuredContent"]["requestsRemaining"], 498);
    Ok(())
}

#[test]
fn tweet_not_found_is_error_envelope() -> anyhow::Result<()> {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(GET).path("/2/tweets/999");
        then.status(200).json_body(json!({
            "errors": [{
                "value": "999",
                "detail": "Could not find tweet with id: [999].",
                "title": "Not Found Error",
                "type": "https://api.twitter.com/2/problems/resource-not-found"
            }]
        }));
    });
    let out = run_with_env(
        &[tool_call(1, "get_tweet_metrics", json!({"tweet_id": "999"}))],
        &[
            ("TWITTER_BEARER_TOKEN", "t"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    let result = &out[0]["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["error"], "Could not find tweet with id: [999].");
    assert_eq!(result["structuredContent"]["code"], "not_found");
    // The lookup reached the upstream, so it counts.
    assert_eq!(result["structuredContent"]["requestsRemaining"], 499);
    Ok(())
}

#[test]
fn unauthorized_status_maps_to_code() -> anyhow::Result<()> {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(GET).path("/2/tweets/1");
        then.status(401).json_body(json!({
            "title": "Unauthorized", "type": "about:blank", "status": 401, "detail": "Unauthorized"
        }));
    });
    let out = run_with_env(
        &[tool_call(1, "get_tweet_metrics", json!({"tweet_id": "1"}))],
        &[
            ("TWITTER_BEARER_TOKEN", "bad"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    let sc = &out[0]["result"]["structuredContent"];
    assert_eq!(sc["code"], "unauthorized");
    assert_eq!(sc["error"], "Unauthorized");
    Ok(())
}

#[test]
fn upstream_429_reports_reset() -> anyhow::Result<()> {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(GET).path("/2/tweets/search/recent");
        then.status(429)
            .header("x-rate-limit-limit", "450")
            .header("x-rate-limit-remaining", "0")
            .header("x-rate-limit-reset", "0")
            .json_body(json!({"title": "Too Many Requests", "detail": "Too Many Requests", "status": 429}));
    });
    let out = run_with_env(
        &[tool_call(1, "search_tweets", json!({"query": "rust"}))],
        &[
            ("TWITTER_BEARER_TOKEN", "t"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    let sc = &out[0]["result"]["structuredContent"];
    assert_eq!(sc["code"], "rate_limited");
    assert_eq!(sc["upstreamRate"]["limit"], 450);
    assert_eq!(sc["upstreamRate"]["reset_at"], "1970-01-01T00:00:00+00:00");
    Ok(())
}

#[test]
fn search_tweets_clamps_and_echoes_query() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET)
            .path("/2/tweets/search/recent")
            .query_param("query", "from:rustlang -is:retweet")
            .query_param("max_results", "10")
            .query_param("start_time", "2026-01-20T00:00:00Z");
        then.status(200).json_body(json!({
            "data": [
                {"id": "1", "text": "a", "author_id": "10", "created_at": "2026-01-21T00:00:00.000Z",
                 "public_metrics": {"like_count": 1, "retweet_count": 2, "reply_count": 3, "quote_count": 4}},
                {"id": "2", "text": "b", "author_id": "11"}
            ],
            "meta": {"result_count": 2}
        }));
    });
    let out = run_with_env(
        &[tool_call(
            1,
            "search_tweets",
            json!({"query": "from:rustlang -is:retweet", "max_results": 1, "start_time": "2026-01-20T00:00:00Z"}),
        )],
        &[
            ("TWITTER_BEARER_TOKEN", "t"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    m.assert();
    let sc = &out[0]["result"]["structuredContent"];
    assert_eq!(sc["count"], 2);
    assert_eq!(sc["query"], "from:rustlang -is:retweet");
    assert_eq!(
        sc["tweets"][0]["metrics"],
        json!({"likes": 1, "retweets": 2, "replies": 3, "quotes": 4})
    );
    assert_eq!(sc["tweets"][1]["metrics"]["likes"], 0);
    Ok(())
}

#[test]
fn get_replies_searches_conversation() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET)
            .path("/2/tweets/search/recent")
            .query_param("query", "conversation_id:555")
            .query_param("max_results", "100")
            .query_param("tweet.fields", REPLY_FIELDS);
        then.status(200).json_body(json!({"meta": {"result_count": 0}}));
    });
    let out = run_with_env(
        &[tool_call(1, "get_replies", json!({"tweet_id": "555", "max_results": 1000}))],
        &[
            ("TWITTER_BEARER_TOKEN", "t"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    m.assert();
    let sc = &out[0]["result"]["structuredContent"];
    assert_eq!(sc["replies"], json!([]));
    assert_eq!(sc["count"], 0);
    assert_eq!(sc["conversation_id"], "555");
    Ok(())
}

#[test]
fn get_replies_reports_reply_parents() -> anyhow::Result<()> {
    let server = MockServer::start();
    let m = server.mock(|when, then| {
        when.method(GET)
            .path("/2/tweets/search/recent")
            .query_param("query", "conversation_id:555")
            .query_param("max_results", "20")
            .query_param("tweet.fields", REPLY_FIELDS);
        then.status(200).json_body(json!({
            "data": [
                {"id": "601", "text": "@a yes", "conversation_id": "555",
                 "referenced_tweets": [{"type": "replied_to", "id": "555"}],
                 "public_metrics": {"like_count": 3}},
                {"id": "602", "text": "@b no", "conversation_id": "555",
                 "referenced_tweets": [{"type": "replied_to", "id": "601"}]}
            ]
        }));
    });
    let out = run_with_env(
        &[tool_call(1, "get_replies", json!({"tweet_id": "555", "max_results": "20"}))],
        &[
            ("TWITTER_BEARER_TOKEN", "t"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    m.assert();
    let sc = &out[0]["result"]["structuredContent"];
    assert_eq!(sc["count"], 2);
    assert_eq!(sc["replies"][0]["in_reply_to_tweet_id"], "555");
    assert_eq!(sc["replies"][0]["metrics"]["likes"], 3);
    assert_eq!(sc["replies"][1]["in_reply_to_tweet_id"], "601");
    Ok(())
}

#[test]
fn get_mentions_resolves_identity_with_app_credentials() -> anyhow::Result<()> {
    let server = MockServer::start();
    let token = server.mock(|when, then| {
        when.method(POST)
            .path("/oauth2/token")
            .header("authorization", "Basic a2V5OnNlY3JldA==")
            .body("grant_type=client_credentials");
        then.status(200)
            .json_body(json!({"token_type": "bearer", "access_token": "app-token"}));
    });
    let me = server.mock(|when, then| {
        when.method(GET)
            .path("/2/users/me")
            .header("authorization", "Bearer app-token");
        then.status(200)
            .json_body(json!({"data": {"id": "42", "username": "me", "name": "Me"}}));
    });
    let mentions = server.mock(|when, then| {
        when.method(GET)
            .path("/2/users/42/mentions")
            .query_param("max_results", "5");
        then.status(200).json_body(json!({
            "data": [{"id": "7", "text": "@me hello", "author_id": "9",
                      "public_metrics": {"like_count": 2}}]
        }));
    });

    let out = run_with_env(
        &[
            tool_call(1, "get_mentions", json!({"max_results": 1})),
            tool_call(2, "get_mentions", json!({})),
        ],
        &[
            ("TWITTER_API_KEY", "key"),
            ("TWITTER_API_SECRET", "secret"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    token.assert_hits(1);
    me.assert_hits(2);
    mentions.assert_hits(1);

    let sc = &out[0]["result"]["structuredContent"];
    assert_eq!(sc["count"], 1);
    assert_eq!(sc["mentions"][0]["tweet_id"], "7");
    assert_eq!(sc["mentions"][0]["metrics"]["likes"], 2);
    // Identity + timeline count as one invocation.
    assert_eq!(sc["requestsRemaining"], 499);
    Ok(())
}

#[test]
fn token_exchange_counts_when_the_read_never_leaves() -> anyhow::Result<()> {
    let server = MockServer::start();
    // A token that cannot be used as a header value stops the GET before sending.
    let token = server.mock(|when, then| {
        when.method(POST).path("/oauth2/token");
        then.status(200)
            .json_body(json!({"token_type": "bearer", "access_token": "broken\ntoken"}));
    });
    let any_get = server.mock(|when, then| {
        when.method(GET);
        then.status(200).json_body(json!({}));
    });
    let out = run_with_env(
        &[tool_call(1, "get_tweet_metrics", json!({"tweet_id": "1"}))],
        &[
            ("TWITTER_API_KEY", "key"),
            ("TWITTER_API_SECRET", "secret"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    token.assert_hits(1);
    any_get.assert_hits(0);
    let result = &out[0]["result"];
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["code"], "config_error");
    assert_eq!(result["structuredContent"]["requestsRemaining"], 499);
    Ok(())
}

#[test]
fn validation_errors_do_not_reach_upstream() -> anyhow::Result<()> {
    let server = MockServer::start();
    let any = server.mock(|when, then| {
        when.method(GET);
        then.status(200).json_body(json!({}));
    });
    let out = run_with_env(
        &[
            tool_call(1, "get_replies", json!({})),
            tool_call(2, "bogus_tool", json!({})),
        ],
        &[
            ("TWITTER_BEARER_TOKEN", "t"),
            ("TWITTER_API_URL", server.base_url().as_str()),
        ],
    )?;
    any.assert_hits(0);
    assert_eq!(out[0]["result"]["structuredContent"]["code"], "invalid_params");
    assert_eq!(out[0]["result"]["structuredContent"]["requestsRemaining"], 500);
    assert_eq!(out[1]["result"]["structuredContent"]["error"], "Unknown tool: bogus_tool");
    assert_eq!(out[1]["result"]["isError"], true);
    Ok(())
}
