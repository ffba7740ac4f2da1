//! # devonthink-mcp
//!
//! MCP (Model Context Protocol) server exposing DEVONthink data that its
//! scripting interface does not reach, by reading the application's own
//! configuration files.
//!
//! ## Available Tools
//!
//! - `list_smart_groups`: smart groups from `SmartGroups.plist`
//! - `list_smart_rules`: smart rules from `SmartRules.plist`
//! - `get_column_layout`: the column layout stored for a group
//! - `copy_column_layout`: copy a layout between groups in one atomic write
//! - `parse_email_headers`: threading headers of an `.eml` file
//!
//! Every tool answers with a tagged JSON object, `{"success": true, ...}` or
//! `{"success": false, "error": "...", ...}`.
//!
//! ## Usage with Claude Desktop
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "devonthink": {
//!       "command": "devonthink-mcp",
//!       "args": []
//!     }
//!   }
//! }
//! ```
//!
//! ## External commands
//!
//! Binary plists are converted with `plutil`, preference keys are read with
//! `defaults`, and layout copies run a `python3` plistlib transaction. All of
//! them go through [`exec::CommandRunner`] with a timeout and an output cap.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod email;
pub mod error;
pub mod exec;
pub mod layout;
pub mod outcome;
pub mod plist;
pub mod protocol;
pub mod server;
pub mod smart;
pub mod tools;

pub use config::{Config, Paths};
pub use error::{Error, Result};
pub use outcome::{Failure, Outcome};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpMessage};
pub use server::McpServer;
pub use tools::{Tool, ToolContext, ToolRegistry};
