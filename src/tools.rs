//! Tool definitions and registry for the MCP server.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::config::{Config, Paths};
use crate::email;
use crate::error::{Error, Result};
use crate::exec::{CommandRunner, SystemRunner};
use crate::layout::{self, CopyRequest, DefaultsStore, PreferenceStore};
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::smart;

/// Tool trait for implementing MCP tools.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult>;
}

/// Context passed to tools during execution.
pub struct ToolContext {
    /// File locations.
    pub paths: Paths,
    /// Runs `plutil` and friends.
    pub runner: Arc<dyn CommandRunner>,
    /// The preference store holding column layouts.
    pub preferences: Arc<dyn PreferenceStore>,
}

impl ToolContext {
    /// Create a context backed by real commands.
    pub fn new(config: &Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(config.limits));
        let preferences = Arc::new(DefaultsStore::new(
            config.paths.preferences.clone(),
            runner.clone(),
        ));
        Self::with_parts(config.paths.clone(), runner, preferences)
    }

    /// Create a context from explicit collaborators.
    pub fn with_parts(
        paths: Paths,
        runner: Arc<dyn CommandRunner>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            paths,
            runner,
            preferences,
        }
    }
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    context: Arc<ToolContext>,
}

impl ToolRegistry {
    /// Create a registry with the built-in tools.
    pub fn new(context: ToolContext) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
            context: Arc::new(context),
        };

        registry.register(Arc::new(ListSmartGroupsTool));
        registry.register(Arc::new(ListSmartRulesTool));
        registry.register(Arc::new(GetColumnLayoutTool));
        registry.register(Arc::new(CopyColumnLayoutTool));
        registry.register(Arc::new(ParseEmailHeadersTool));

        registry
    }

    /// Get tool definitions, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, arguments: serde_json::Value) -> Result<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        tracing::debug!(tool = name, "executing tool");
        tool.execute(arguments, &self.context).await
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: serde_json::Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn no_arguments_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Lists smart groups from `SmartGroups.plist`.
pub struct ListSmartGroupsTool;

#[async_trait::async_trait]
impl Tool for ListSmartGroupsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_smart_groups".into(),
            description: "List DEVONthink smart groups (name, UUID, last sync date) read from SmartGroups.plist, sorted by name.".into(),
            input_schema: no_arguments_schema(),
        }
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let outcome =
            smart::list_smart_groups(&context.paths.smart_groups, context.runner.as_ref()).await;
        ToolCallResult::from_outcome(&outcome)
    }
}

/// Lists smart rules from `SmartRules.plist`.
pub struct ListSmartRulesTool;

#[async_trait::async_trait]
impl Tool for ListSmartRulesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_smart_rules".into(),
            description: "List DEVONthink smart rules (name, UUID, enabled flag, last execution) read from SmartRules.plist, sorted by name.".into(),
            input_schema: no_arguments_schema(),
        }
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let outcome =
            smart::list_smart_rules(&context.paths.smart_rules, context.runner.as_ref()).await;
        ToolCallResult::from_outcome(&outcome)
    }
}

/// Reads the column layout of a group or smart group.
pub struct GetColumnLayoutTool;

#[derive(Debug, Deserialize)]
struct GetColumnLayoutArgs {
    /// Group or smart group name.
    name: String,
    /// UUID to try when the name has no layout.
    #[serde(default)]
    uuid: Option<String>,
}

#[async_trait::async_trait]
impl Tool for GetColumnLayoutTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_column_layout".into(),
            description: "Read the column layout (visible columns, all columns, widths) DEVONthink stores for a group or smart group. Falls back to the UUID, then to a unique case-insensitive partial name match.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Group or smart group name"
                    },
                    "uuid": {
                        "type": "string",
                        "description": "UUID to try when no layout is stored under the name"
                    }
                },
                "required": ["name"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: GetColumnLayoutArgs = parse_args(arguments)?;
        let outcome = layout::read_layout(
            context.preferences.as_ref(),
            &args.name,
            args.uuid.as_deref(),
        )
        .await;
        ToolCallResult::from_outcome(&outcome)
    }
}

/// Copies a column layout from one group to another.
pub struct CopyColumnLayoutTool;

#[async_trait::async_trait]
impl Tool for CopyColumnLayoutTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "copy_column_layout".into(),
            description: "Copy a column layout from one group or smart group to another in a single atomic preferences write. DEVONthink must be restarted (or the window reopened) to show the copied layout.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sourceName": {
                        "type": "string",
                        "description": "Name whose layout is copied (exact, UUID fallback, then unique partial match)"
                    },
                    "targetName": {
                        "type": "string",
                        "description": "Name receiving the layout (taken literally)"
                    },
                    "sourceUuid": {
                        "type": "string",
                        "description": "UUID to try when no layout is stored under sourceName"
                    },
                    "targetUuid": {
                        "type": "string",
                        "description": "Store the layout under this UUID instead of targetName"
                    }
                },
                "required": ["sourceName", "targetName"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let request: CopyRequest = parse_args(arguments)?;
        let outcome = layout::copy_layout(context.preferences.as_ref(), &request).await;
        ToolCallResult::from_outcome(&outcome)
    }
}

/// Parses the headers of an email file.
pub struct ParseEmailHeadersTool;

#[derive(Debug, Deserialize)]
struct ParseEmailHeadersArgs {
    /// Message file path.
    path: PathBuf,
}

#[async_trait::async_trait]
impl Tool for ParseEmailHeadersTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "parse_email_headers".into(),
            description: "Parse Message-ID, In-Reply-To, References, Subject, From, To, Cc and Date from an email file (.eml). Reads only the first 64 KB; encoded words are decoded.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute path of the message file"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: ParseEmailHeadersArgs = parse_args(arguments)?;
        let outcome = email::parse_headers(&args.path).await;
        ToolCallResult::from_outcome(&outcome)
    }
}
