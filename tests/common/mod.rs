use assert_cmd::Command;
use std::io::Write;

const CREDENTIAL_VARS: [&str; 3] = [
    "TWITTER_BEARER_TOKEN",
    "TWITTER_API_KEY",
    "TWITTER_API_SECRET",
];

/// Run the server with one request per line and return each response line as JSON.
pub fn run_with_env(
    reqs: &[serde_json::Value],
    envs: &[(&str, &str)],
) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut cmd = Command::cargo_bin("twitter-read-mcp")?;
    for k in CREDENTIAL_VARS {
        cmd.env_remove(k);
    }
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut input = Vec::new();
    for req in reqs {
        writeln!(input, "{}", serde_json::to_string(req)?)?;
    }
    let assert = cmd
        .arg("--log-level")
        .arg("warn")
        .write_stdin(input)
        .assert()
        .success();
    let output = String::from_utf8(assert.get_output().stdout.clone())?;
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Ok(serde_json::from_str(l)?))
        .collect()
}

pub fn tool_call(id: i64, name: &str, arguments: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0", "method": "tools/call", "id": id,
        "params": {"name": name, "arguments": arguments}
    })
}
