//! MCP server validation tests.
//!
//! Tests JSON-RPC 2.0 protocol compliance, tool execution, and error handling,
//! both against the built binary over stdio and in-process.

mod common;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;

use devonthink_mcp::exec::CommandRunner;
use devonthink_mcp::{McpServer, Paths, ToolContext};

use common::{list, MemoryStore, ScriptedRunner};

// JSON-RPC 2.0 types
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcRequest {
    fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    fn initialize(id: u64) -> Self {
        Self::new(
            id,
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "0.1.0"}
            })),
        )
    }

    fn call(id: u64, tool: &str, arguments: Value) -> Self {
        Self::new(
            id,
            "tools/call",
            Some(json!({"name": tool, "arguments": arguments})),
        )
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    /// The tagged JSON object carried in the first text content item.
    fn tool_payload(&self) -> Value {
        let text = self
            .result
            .as_ref()
            .and_then(|r| r.get("content"))
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("null");
        serde_json::from_str(text).unwrap()
    }

    fn is_tool_error(&self) -> bool {
        self.result
            .as_ref()
            .and_then(|r| r.get("isError"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Fixture files the spawned server is pointed at.
struct Fixtures {
    dir: tempfile::TempDir,
}

impl Fixtures {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("SmartGroups.plist"),
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<array>
	<dict>
		<key>name</key>
		<string>Unread PDFs</string>
		<key>sync</key>
		<dict>
			<key>UUID</key>
			<string>AAAA-1111</string>
		</dict>
	</dict>
</array>
</plist>
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("message.eml"),
            "Message-ID: <one@example.com>\nSubject: =?UTF-8?B?aMOpbGxv?=\n\nbody\n",
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// MCP test client for validating the server.
struct McpTestClient {
    child: Child,
    stdout: BufReader<ChildStdout>,
}

impl McpTestClient {
    async fn spawn(fixtures: &Fixtures) -> Result<Self, Box<dyn std::error::Error>> {
        let mut child = Command::new(env!("CARGO_BIN_EXE_devonthink-mcp"))
            .env("DEVONTHINK_SMART_GROUPS", fixtures.path("SmartGroups.plist"))
            .env("DEVONTHINK_SMART_RULES", fixtures.path("SmartRules.plist"))
            .env("DEVONTHINK_PREFERENCES", fixtures.path("prefs.plist"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or("No stdout")?;
        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
        })
    }

    async fn send(&mut self, request: &JsonRpcRequest) -> Result<(), Box<dyn std::error::Error>> {
        let stdin = self.child.stdin.as_mut().ok_or("No stdin")?;
        let request_json = serde_json::to_string(request)?;
        stdin.write_all(request_json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn send_request(
        &mut self,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, Box<dyn std::error::Error>> {
        self.send(&request).await?;

        // Read response with timeout
        let mut line = String::new();
        let read = timeout(Duration::from_secs(5), self.stdout.read_line(&mut line)).await??;
        if read == 0 {
            return Err("Server closed connection".into());
        }

        Ok(serde_json::from_str(&line)?)
    }

    async fn initialized(fixtures: &Fixtures) -> Result<Self, Box<dyn std::error::Error>> {
        let mut client = Self::spawn(fixtures).await?;
        let response = client.send_request(JsonRpcRequest::initialize(1)).await?;
        if response.error.is_some() {
            return Err("initialize failed".into());
        }
        client
            .send(&JsonRpcRequest {
                jsonrpc: "2.0".into(),
                id: None,
                method: "notifications/initialized".into(),
                params: None,
            })
            .await?;
        Ok(client)
    }

    async fn close(mut self) {
        let _ = self.child.kill().await;
    }
}

// ============================================================================
// Protocol Compliance Tests
// ============================================================================

#[tokio::test]
async fn test_initialize_handshake() {
    let fixtures = Fixtures::new();
    let mut client = match McpTestClient::spawn(&fixtures).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping test, MCP server not available: {}", e);
            return;
        }
    };

    let response = client
        .send_request(JsonRpcRequest::initialize(1))
        .await
        .expect("initialize answered");
    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, Some(1));
    assert!(response.error.is_none(), "Should not have error");

    let result = response.result.expect("initialize result");
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "devonthink-mcp");
    assert!(result["capabilities"].get("tools").is_some());

    client.close().await;
}

#[tokio::test]
async fn test_list_tools() {
    let fixtures = Fixtures::new();
    let mut client = match McpTestClient::initialized(&fixtures).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping test, MCP server not available: {}", e);
            return;
        }
    };

    let response = client
        .send_request(JsonRpcRequest::new(2, "tools/list", None))
        .await
        .expect("tools/list answered");
    assert!(response.error.is_none(), "Should not have error");

    let result = response.result.expect("tools/list result");
    let tools = result["tools"].as_array().expect("tools array");
    let tool_names: Vec<&str> = tools
        .iter()
        .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
        .collect();
    assert_eq!(
        tool_names,
        vec![
            "copy_column_layout",
            "get_column_layout",
            "list_smart_groups",
            "list_smart_rules",
            "parse_email_headers",
        ]
    );
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }

    client.close().await;
}

#[tokio::test]
async fn test_tool_call_list_smart_groups() {
    let fixtures = Fixtures::new();
    let mut client = match McpTestClient::initialized(&fixtures).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping test, MCP server not available: {}", e);
            return;
        }
    };

    let response = client
        .send_request(JsonRpcRequest::call(3, "list_smart_groups", json!({})))
        .await
        .expect("tools/call answered");
    assert!(response.error.is_none());
    assert!(!response.is_tool_error());

    let payload = response.tool_payload();
    assert_eq!(payload["success"], true);
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["smartGroups"][0]["name"], "Unread PDFs");
    assert_eq!(payload["smartGroups"][0]["uuid"], "AAAA-1111");

    client.close().await;
}

#[tokio::test]
async fn test_tool_call_missing_file_is_tool_error() {
    let fixtures = Fixtures::new();
    let mut client = match McpTestClient::initialized(&fixtures).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping test, MCP server not available: {}", e);
            return;
        }
    };

    let response = client
        .send_request(JsonRpcRequest::call(4, "list_smart_rules", Value::Null))
        .await
        .expect("tools/call answered");
    assert!(response.error.is_none(), "failures are tool results");
    assert!(response.is_tool_error());

    let payload = response.tool_payload();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["kind"], "not_found");
    assert_eq!(
        payload["path"],
        fixtures.path("SmartRules.plist").display().to_string()
    );

    client.close().await;
}

#[tokio::test]
async fn test_tool_call_parse_email_headers() {
    let fixtures = Fixtures::new();
    let mut client = match McpTestClient::initialized(&fixtures).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping test, MCP server not available: {}", e);
            return;
        }
    };

    let response = client
        .send_request(JsonRpcRequest::call(
            5,
            "parse_email_headers",
            json!({"path": fixtures.path("message.eml")}),
        ))
        .await
        .expect("tools/call answered");

    let payload = response.tool_payload();
    assert_eq!(payload["success"], true);
    assert_eq!(payload["messageId"], "<one@example.com>");
    assert_eq!(payload["subject"], "héllo");
    assert_eq!(payload["references"], json!([]));

    client.close().await;
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_tool_and_method() {
    let fixtures = Fixtures::new();
    let mut client = match McpTestClient::initialized(&fixtures).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping test, MCP server not available: {}", e);
            return;
        }
    };

    let response = client
        .send_request(JsonRpcRequest::call(6, "nonexistent_tool", json!({})))
        .await
        .expect("tools/call answered");
    let error = response.error.expect("unknown tool is an error");
    assert_eq!(error.code, -32601);
    assert!(error.message.contains("nonexistent_tool"));

    let response = client
        .send_request(JsonRpcRequest::new(7, "resources/list", None))
        .await
        .expect("request answered");
    assert_eq!(response.id, Some(7));
    assert_eq!(response.error.expect("unknown method").code, -32601);

    client.close().await;
}

#[tokio::test]
async fn test_invalid_arguments() {
    let fixtures = Fixtures::new();
    let mut client = match McpTestClient::initialized(&fixtures).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Skipping test, MCP server not available: {}", e);
            return;
        }
    };

    let response = client
        .send_request(JsonRpcRequest::call(8, "get_column_layout", json!({"uuid": 5})))
        .await
        .expect("tools/call answered");
    assert_eq!(response.error.expect("bad arguments").code, -32602);

    client.close().await;
}

// ============================================================================
// In-process Tests
// ============================================================================

async fn serve_lines(server: &McpServer, lines: &[Value]) -> Vec<Value> {
    let input: String = lines.iter().map(|line| format!("{line}\n")).collect();
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn in_process_server(store: MemoryStore) -> McpServer {
    let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::unused());
    let paths = Paths::under_home(Path::new("/nonexistent-home"));
    McpServer::with_context(ToolContext::with_parts(paths, runner, Arc::new(store)))
}

#[tokio::test]
async fn test_tools_require_initialize() {
    let server = in_process_server(MemoryStore::new());
    let responses = serve_lines(
        &server,
        &[json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["error"]["code"], -32603);
}

#[tokio::test]
async fn test_malformed_lines_and_notifications() {
    let server = in_process_server(MemoryStore::new());
    let input = "not json\n\n{\"jsonrpc\":\"1.0\",\"id\":2,\"method\":\"ping\"}\n\
                 {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\
                 {\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"ping\"}\n";
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[1]["error"]["code"], -32600);
    assert_eq!(responses[2]["id"], 3);
    assert_eq!(responses[2]["result"], json!({}));
}

#[tokio::test]
async fn test_copy_column_layout_through_server() {
    let store = MemoryStore::new()
        .with("columns-Inbox", list(&["name", "kind"]))
        .with("tableViewColumns-Inbox", list(&["name", "kind", "size"]));
    let server = in_process_server(store);

    let responses = serve_lines(
        &server,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05", "capabilities": {}
            }}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
                "name": "copy_column_layout",
                "arguments": {"sourceName": "inbox", "targetName": "Archive"}
            }}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {
                "name": "get_column_layout",
                "arguments": {"name": "Archive"}
            }}),
        ],
    )
    .await;

    assert_eq!(responses.len(), 3);
    let payload = |response: &Value| -> Value {
        serde_json::from_str(response["result"]["content"][0]["text"].as_str().unwrap()).unwrap()
    };

    let copied = payload(&responses[1]);
    assert_eq!(copied["success"], true);
    assert_eq!(copied["sourceKey"], "Inbox");
    assert_eq!(copied["fuzzyMatch"], true);
    assert_eq!(copied["verified"], true);

    let read = payload(&responses[2]);
    assert_eq!(read["matchedBy"], "exact");
    assert_eq!(read["columns"], json!(["name", "kind"]));
    assert_eq!(read["tableViewColumns"], json!(["name", "kind", "size"]));
}
