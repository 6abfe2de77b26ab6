#[path = "../common/mod.rs"]
mod common;

use common::{run_with_env, tool_call};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn credentials() -> Option<Vec<(&'static str, String)>> {
    if !matches!(env_var("LIVE_API_TESTS").as_deref(), Some("1")) {
        return None;
    }
    if let Some(t) = env_var("TWITTER_BEARER_TOKEN") {
        return Some(vec![("TWITTER_BEARER_TOKEN", t)]);
    }
    match (env_var("TWITTER_API_KEY"), env_var("TWITTER_API_SECRET")) {
        (Some(k), Some(s)) => Some(vec![("TWITTER_API_KEY", k), ("TWITTER_API_SECRET", s)]),
        _ => None,
    }
}

#[ignore]
#[test]
fn live_search_and_metrics() -> anyhow::Result<()> {
    let Some(creds) = credentials() else {
        eprintln!("skipping live test: LIVE_API_TESTS!=1 or credentials missing");
        return Ok(());
    };
    let envs: Vec<(&str, &str)> = creds.iter().map(|(k, v)| (*k, v.as_str())).collect();
    let query = env_var("E2E_QUERY").unwrap_or_else(|| "rustlang".to_string());

    let out = run_with_env(
        &[tool_call(1, "search_tweets", serde_json::json!({"query": query, "max_results": 10}))],
        &envs,
    )?;
    let sc = &out[0]["result"]["structuredContent"];
    assert!(sc["requestsRemaining"].is_number());
    if out[0]["result"]["isError"] == true {
        eprintln!("search failed upstream: {}", sc["error"]);
        return Ok(());
    }

    let Some(first_id) = sc["tweets"][0]["tweet_id"].as_str() else {
        eprintln!("no tweets matched {}", query);
        return Ok(());
    };
    let out = run_with_env(
        &[tool_call(2, "get_tweet_metrics", serde_json::json!({"tweet_id": first_id}))],
        &envs,
    )?;
    // App-only credentials may be refused non-public metrics; either way an envelope comes back.
    assert!(out[0]["result"]["structuredContent"]["requestsRemaining"].is_number());
    Ok(())
}
