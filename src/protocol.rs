//! JSON-RPC 2.0 framing and the MCP message shapes this server exchanges.
//!
//! Only the tool-serving subset of the Model Context Protocol is modelled:
//! https://spec.modelcontextprotocol.io/

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{codes, Error};
use crate::outcome::Outcome;

/// Value of the `jsonrpc` member on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier, echoed back on the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

/// An inbound call. Without an `id` it is a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"` once validated.
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    /// Method name.
    pub method: String,
    /// Raw parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Whether the caller expects no answer.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Decode `params` into `T`. Missing params are an error.
    pub fn params<T: DeserializeOwned>(&self) -> crate::Result<T> {
        let params = self
            .params
            .clone()
            .ok_or_else(|| Error::InvalidParams(format!("{} requires params", self.method)))?;
        serde_json::from_value(params)
            .map_err(|e| Error::InvalidParams(format!("{}: {e}", self.method)))
    }
}

/// Answer to a request: exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request being answered; `None` when it could not be read.
    pub id: Option<JsonRpcId>,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Successful answer. A result that cannot be serialized becomes an
    /// internal error.
    pub fn success(id: Option<JsonRpcId>, result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::reply(id, Ok(value)),
            Err(e) => Self::error(
                id,
                codes::INTERNAL_ERROR,
                format!("failed to serialize result: {e}"),
            ),
        }
    }

    /// Error answer with an explicit code.
    pub fn error(id: Option<JsonRpcId>, code: i32, message: impl Into<String>) -> Self {
        Self::reply(
            id,
            Err(JsonRpcError {
                code,
                message: message.into(),
            }),
        )
    }

    /// Error answer carrying `err`'s code and message.
    pub fn from_error(id: Option<JsonRpcId>, err: &Error) -> Self {
        Self::error(id, err.code(), err.to_string())
    }

    fn reply(id: Option<JsonRpcId>, body: std::result::Result<Value, JsonRpcError>) -> Self {
        let (result, error) = match body {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result,
            error,
        }
    }
}

/// The `error` member of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

/// One decoded line of the stdio stream.
#[derive(Debug, Clone)]
pub enum McpMessage {
    /// A call that expects an answer.
    Request(JsonRpcRequest),
    /// A call that expects none.
    Notification(JsonRpcRequest),
    /// An answer from the client (never solicited by this server).
    Response(JsonRpcResponse),
}

impl McpMessage {
    /// Decode and validate one message.
    ///
    /// Invalid JSON is a parse error; valid JSON of the wrong shape or
    /// version is an invalid request.
    pub fn parse(line: &str) -> crate::Result<Self> {
        let value: Value = serde_json::from_str(line)?;

        if value.get("method").is_none() {
            if value.get("result").is_some() || value.get("error").is_some() {
                return Ok(McpMessage::Response(serde_json::from_value(value)?));
            }
            return Err(invalid_request("neither a request nor a response"));
        }

        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|e| invalid_request(&e.to_string()))?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(invalid_request(&format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            )));
        }

        Ok(if request.is_notification() {
            McpMessage::Notification(request)
        } else {
            McpMessage::Request(request)
        })
    }
}

fn invalid_request(message: &str) -> Error {
    Error::JsonRpc {
        code: codes::INVALID_REQUEST,
        message: message.to_string(),
    }
}

// ============================================================================
// MCP payloads
// ============================================================================

/// Name and version of either peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Program name.
    pub name: String,
    /// Program version.
    #[serde(default)]
    pub version: String,
}

/// `initialize` parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Version the client speaks.
    pub protocol_version: String,
    /// Client capabilities; accepted but not interpreted.
    #[serde(default)]
    pub capabilities: Value,
    /// Who is connecting.
    #[serde(default)]
    pub client_info: Option<Implementation>,
}

/// `initialize` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Version the server speaks.
    pub protocol_version: String,
    /// What the server offers.
    pub capabilities: ServerCapabilities,
    /// Who is answering.
    pub server_info: Implementation,
}

/// Capabilities advertised at `initialize`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Present when tools are served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Tool serving options.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// The tool list never changes at runtime here.
    pub list_changed: bool,
}

/// One entry of `tools/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does, for the model.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub input_schema: Value,
}

/// `tools/list` result.
#[derive(Debug, Clone, Serialize)]
pub struct ListToolsResult {
    /// Every registered tool.
    pub tools: Vec<ToolDefinition>,
}

/// `tools/call` parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Tool to run.
    pub name: String,
    /// Arguments object; `null` when omitted.
    #[serde(default)]
    pub arguments: Value,
}

/// `tools/call` result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Output items.
    pub content: Vec<ContentItem>,
    /// Set when the operation reported a failure.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Render an operation outcome as one pretty-printed JSON text item.
    ///
    /// `isError` mirrors `success: false`.
    pub fn from_outcome<T: Serialize>(outcome: &Outcome<T>) -> crate::Result<Self> {
        let text = serde_json::to_string_pretty(&outcome.to_value())?;
        Ok(Self {
            content: vec![ContentItem::Text { text }],
            is_error: !outcome.is_success(),
        })
    }
}

/// Tool output item.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}
