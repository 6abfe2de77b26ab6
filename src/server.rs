use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::mcp::mcp_wrap;
use crate::tools::*;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

// Minimal JSON-RPC 2.0 types
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Id {
    Str(String),
    Num(i64),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn rpc_error(id: Option<Id>, code: i64, message: &str, data: Option<Value>) -> Response {
    Response { jsonrpc: "2.0".into(), result: None, error: Some(RpcError { code, message: message.into(), data }), id }
}

fn rpc_ok(id: Option<Id>, result: Value) -> Response {
    Response { jsonrpc: "2.0".into(), result: Some(result), error: None, id }
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Protocol front end over a single dispatcher.
pub struct Server {
    dispatcher: Dispatcher,
}

impl Server {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Handle one line of input. Notifications and blank lines produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        if line.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<Request>(line) {
            Ok(req) => self.handle(req).await,
            Err(e) => Some(rpc_error(None, -32700, &format!("Parse error: {}", e), None)),
        }
    }

    pub async fn handle(&self, req: Request) -> Option<Response> {
        debug!("Received method={}", req.method);
        let Some(id) = req.id else {
            debug!("Notification {} acknowledged", req.method);
            return None;
        };
        let id = Some(id);
        let resp = match req.method.as_str() {
            "initialize" => handle_initialize(id),
            "ping" => rpc_ok(id, serde_json::json!({})),
            "tools/list" => rpc_ok(id, serde_json::json!({ "tools": tool_descriptors() })),
            "tools/call" => self.handle_tools_call(id, req.params).await,
            other => rpc_error(id, -32601, &format!("Method not found: {}", other), None),
        };
        Some(resp)
    }

    async fn handle_tools_call(&self, id: Option<Id>, params: Value) -> Response {
        let parsed: Result<ToolCallParams, _> = serde_json::from_value(params);
        let Ok(call) = parsed else {
            return rpc_error(id, -32602, "Invalid params", None);
        };
        let envelope = self.dispatcher.dispatch(&call.name, call.arguments).await;
        rpc_ok(id, mcp_wrap(envelope.to_value(), envelope.is_error()))
    }
}

fn handle_initialize(id: Option<Id>) -> Response {
    rpc_ok(
        id,
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "twitter-read-mcp",
                "version": env!("CARGO_PKG_VERSION"),
            }
        }),
    )
}

pub async fn run_stdio_server() -> anyhow::Result<()> {
    if let Err(e) = Config::from_env() {
        // tools/list still works; tools/call reports the problem per call.
        warn!("{}", e);
    }
    let server = Server::new(Dispatcher::from_env());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();
    info!("Twitter read MCP server running on stdio; protocol={}", PROTOCOL_VERSION);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; shutting down");
                break;
            }
        };
        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };
        if let Some(resp) = server.handle_line(&line).await {
            write_response(&mut out, &resp).await?;
        }
    }
    Ok(())
}

async fn write_response(out: &mut tokio::io::Stdout, resp: &Response) -> anyhow::Result<()> {
    let mut payload = serde_json::to_string(resp)?;
    payload.push('\n');
    out.write_all(payload.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}
