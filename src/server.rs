//! MCP server: a line-oriented JSON-RPC loop over the tool registry.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{codes, Error, Result};
use crate::protocol::{
    Implementation, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, McpMessage, ServerCapabilities, ToolCallParams, ToolCallResult,
    ToolsCapability,
};
use crate::tools::{ToolContext, ToolRegistry};

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name.
pub const SERVER_NAME: &str = "devonthink-mcp";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Only `initialize` and `ping` are served.
    Uninitialized,
    /// Tools are served.
    Ready,
    /// The loop stops after the current message.
    ShuttingDown,
}

/// MCP server exposing the DEVONthink configuration readers.
pub struct McpServer {
    state: Arc<RwLock<ServerState>>,
    tools: Arc<ToolRegistry>,
}

impl McpServer {
    /// Create a server for the given configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_context(ToolContext::new(config))
    }

    /// Create a server with explicit tool collaborators.
    pub fn with_context(context: ToolContext) -> Self {
        Self {
            state: Arc::new(RwLock::new(ServerState::Uninitialized)),
            tools: Arc::new(ToolRegistry::new(context)),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ServerState) {
        *self.state.write().await = state;
    }

    /// Run the server on stdio.
    pub async fn run_stdio(&self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve newline-delimited JSON-RPC from `reader`, answering on `writer`.
    ///
    /// Returns at end of input or after `shutdown` / `exit`.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("MCP server listening");

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            tracing::debug!(%line, "received");

            if let Some(response) = self.handle_message(line).await {
                let mut json = serde_json::to_vec(&response)?;
                json.push(b'\n');
                writer.write_all(&json).await?;
                writer.flush().await?;
            }

            if self.state().await == ServerState::ShuttingDown {
                break;
            }
        }

        tracing::info!("MCP server stopped");
        Ok(())
    }

    /// Handle one raw message; `None` when no answer is due.
    pub async fn handle_message(&self, line: &str) -> Option<JsonRpcResponse> {
        match McpMessage::parse(line) {
            Ok(McpMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(McpMessage::Notification(notification)) => {
                self.handle_notification(&notification).await;
                None
            }
            Ok(McpMessage::Response(response)) => {
                tracing::debug!(id = ?response.id, "ignoring unsolicited response");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "unreadable message");
                Some(JsonRpcResponse::from_error(None, &e))
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match self.dispatch(&request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "request failed");
                JsonRpcResponse::from_error(id, &e)
            }
        }
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> Result<Value> {
        match request.method.as_str() {
            "initialize" => to_value(self.initialize(request.params()?).await),
            "ping" => Ok(json!({})),
            "tools/list" => {
                self.require_ready().await?;
                to_value(ListToolsResult {
                    tools: self.tools.list_tools(),
                })
            }
            "tools/call" => {
                self.require_ready().await?;
                to_value(self.call_tool(request.params()?).await?)
            }
            "shutdown" => {
                self.set_state(ServerState::ShuttingDown).await;
                Ok(json!({}))
            }
            other => Err(Error::JsonRpc {
                code: codes::METHOD_NOT_FOUND,
                message: format!("method not found: {other}"),
            }),
        }
    }

    async fn handle_notification(&self, notification: &JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => tracing::info!("client ready"),
            "notifications/cancelled" => {
                // calls run to completion before the next line is read
                tracing::debug!("cancellation ignored");
            }
            "exit" => self.set_state(ServerState::ShuttingDown).await,
            other => tracing::debug!(method = other, "unknown notification"),
        }
    }

    async fn require_ready(&self) -> Result<()> {
        match self.state().await {
            ServerState::Ready => Ok(()),
            _ => Err(Error::JsonRpc {
                code: codes::INTERNAL_ERROR,
                message: "server not initialized".into(),
            }),
        }
    }

    async fn initialize(&self, params: InitializeParams) -> InitializeResult {
        match &params.client_info {
            Some(client) => tracing::info!(
                client = %client.name,
                version = %client.version,
                protocol = %params.protocol_version,
                "initialize"
            ),
            None => tracing::info!(protocol = %params.protocol_version, "initialize"),
        }

        self.set_state(ServerState::Ready).await;

        InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: Implementation {
                name: SERVER_NAME.into(),
                version: SERVER_VERSION.into(),
            },
        }
    }

    async fn call_tool(&self, params: ToolCallParams) -> Result<ToolCallResult> {
        let result = self.tools.execute(&params.name, params.arguments).await?;
        if result.is_error {
            tracing::info!(tool = %params.name, "tool reported a failure");
        }
        Ok(result)
    }
}

fn to_value(value: impl Serialize) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("failed to serialize result: {e}")))
}
