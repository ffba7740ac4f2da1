//! Error types for the MCP server and the configuration readers.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Server and reader errors.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON-RPC protocol error.
    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
    },

    /// Tool not found.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// An expected file is missing.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// No entity matched the requested name.
    #[error("{message}")]
    NotFound {
        /// Human-readable description of what was looked up.
        message: String,
        /// A sample of the names that do exist.
        known: Vec<String>,
    },

    /// A name matched more than one entity.
    #[error("'{query}' matches {} names; use a more specific name", candidates.len())]
    Ambiguous {
        /// The name as given by the caller.
        query: String,
        /// Every candidate that matched.
        candidates: Vec<String>,
    },

    /// A precondition failed before anything was written.
    #[error("{0}")]
    Precondition(String),

    /// External command exited unsuccessfully.
    #[error("{command} failed: {stderr}")]
    CommandFailed {
        /// Program that was run.
        command: String,
        /// Captured standard error (or exit status when empty).
        stderr: String,
    },

    /// External command did not finish in time.
    #[error("{command} timed out after {secs}s")]
    CommandTimeout {
        /// Program that was run.
        command: String,
        /// Timeout that elapsed.
        secs: u64,
    },

    /// External command produced more output than allowed.
    #[error("{command} produced more than {limit} bytes of output")]
    OutputTooLarge {
        /// Program that was run.
        command: String,
        /// Output cap in bytes.
        limit: usize,
    },

    /// Input could not be interpreted.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::JsonRpc { code, .. } => *code,
            Error::ToolNotFound(_) => codes::METHOD_NOT_FOUND,
            Error::InvalidParams(_) => codes::INVALID_PARAMS,
            Error::FileNotFound { .. } | Error::NotFound { .. } => -32004,
            Error::Ambiguous { .. } | Error::Precondition(_) => -32000,
            Error::CommandFailed { .. }
            | Error::CommandTimeout { .. }
            | Error::OutputTooLarge { .. } => -32001,
            Error::Malformed(_) => -32003,
            Error::Serialization(_) => codes::PARSE_ERROR,
            Error::Io(_) => -32002,
            Error::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Short machine-readable label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::FileNotFound { .. } | Error::NotFound { .. } => "not_found",
            Error::Ambiguous { .. } => "ambiguous",
            Error::Precondition(_) => "precondition",
            Error::CommandFailed { .. }
            | Error::CommandTimeout { .. }
            | Error::OutputTooLarge { .. } => "external_command",
            Error::Malformed(_) | Error::Serialization(_) => "malformed_input",
            Error::InvalidParams(_) => "invalid_params",
            Error::Io(_) => "io",
            Error::JsonRpc { .. } | Error::ToolNotFound(_) | Error::Internal(_) => "internal",
        }
    }
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}
