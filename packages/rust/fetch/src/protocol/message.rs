//! JSON-RPC 2.0 messages exchanged with the fetch tool server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use askpage_shared::{AskPageError, Result};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "mcp-fetch-client";
pub const CLIENT_VERSION: &str = "1.0.0";
pub const FETCH_TOOL: &str = "fetch";

pub const INITIALIZE_ID: u64 = 1;
pub const FETCH_CALL_ID: u64 = 2;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Request<P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: P,
}

#[derive(Debug, Serialize)]
struct Notification {
    jsonrpc: &'static str,
    method: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    protocol_version: &'static str,
    capabilities: ClientCapabilities,
    client_info: ClientInfo,
}

#[derive(Debug, Serialize)]
struct ClientCapabilities {
    roots: RootsCapability,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RootsCapability {
    list_changed: bool,
}

#[derive(Debug, Serialize)]
struct ClientInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ToolCallParams<'a> {
    name: &'static str,
    arguments: FetchArguments<'a>,
}

#[derive(Debug, Serialize)]
struct FetchArguments<'a> {
    url: &'a str,
    max_length: usize,
}

/// The `initialize` request line, id 1.
pub fn initialize_request() -> Result<String> {
    encode(&Request {
        jsonrpc: JSONRPC_VERSION,
        id: INITIALIZE_ID,
        method: "initialize",
        params: InitializeParams {
            protocol_version: PROTOCOL_VERSION,
            capabilities: ClientCapabilities {
                roots: RootsCapability {
                    list_changed: false,
                },
            },
            client_info: ClientInfo {
                name: CLIENT_NAME,
                version: CLIENT_VERSION,
            },
        },
    })
}

/// The `notifications/initialized` line sent after the initialize ack.
pub fn initialized_notification() -> Result<String> {
    encode(&Notification {
        jsonrpc: JSONRPC_VERSION,
        method: "notifications/initialized",
    })
}

/// The `tools/call` line for the fetch tool, id 2.
pub fn fetch_call(url: &str, max_length: usize) -> Result<String> {
    encode(&Request {
        jsonrpc: JSONRPC_VERSION,
        id: FETCH_CALL_ID,
        method: "tools/call",
        params: ToolCallParams {
            name: FETCH_TOOL,
            arguments: FetchArguments { url, max_length },
        },
    })
}

/// Serialize as one newline-terminated line.
fn encode<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)
        .map_err(|e| AskPageError::Protocol(format!("failed to serialize request: {e}")))?;
    line.push('\n');
    Ok(line)
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Any message the server writes. Notifications have no `id`.
#[derive(Debug, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Incoming {
    pub fn has_id(&self, id: u64) -> bool {
        self.id.as_ref().and_then(Value::as_u64) == Some(id)
    }
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// The `protocolVersion` of an initialize result, if this is one.
pub fn protocol_version(result: &Value) -> Option<&str> {
    result.get("protocolVersion").and_then(Value::as_str)
}

/// Outcome of a `tools/call` result payload.
#[derive(Debug, PartialEq, Eq)]
pub enum ToolOutput {
    Text(String),
    /// `isError: true`; carries the tool's own message.
    ToolError(String),
    /// No text item in `content`.
    Empty,
}

/// Interpret `result.content[0].text` and `result.isError`.
pub fn tool_output(result: &Value) -> ToolOutput {
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("text"))
        .and_then(Value::as_str);

    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    match (text, is_error) {
        (Some(text), true) => ToolOutput::ToolError(text.to_string()),
        (None, true) => ToolOutput::ToolError("tool reported an error".into()),
        (Some(text), false) => ToolOutput::Text(text.to_string()),
        (None, false) => ToolOutput::Empty,
    }
}
