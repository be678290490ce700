//! MCP error types.

use crate::protocol::ToolCallResult;

use thiserror::Error;

/// Errors that can occur with MCP operations.
///
/// Every error carries a kind; JSON-RPC errors preserve the numeric code the
/// server returned so callers can dispatch on it (`-32601` method not found,
/// `-32602` invalid params, `-32603` internal error, `-32000` server-defined).
#[derive(Error, Debug)]
pub enum McpError {
    /// Transport could not be brought up (spawn or dial failure)
    #[error("Transport setup failed: {0}")]
    Setup(String),

    /// Transport closed while a request was pending; terminal
    #[error("Transport closed")]
    Closed,

    /// Per-request deadline expired
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// Ambient cancellation fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Frame-level violation (unparseable result, missing fields)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON-RPC error response, code preserved verbatim
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// Numeric JSON-RPC error code
        code: i64,
        /// Human-readable message from the server
        message: String,
        /// Optional server-provided detail
        data: Option<serde_json::Value>,
    },

    /// Operation attempted before the initialize handshake
    #[error("Client not initialized: call initialize() first")]
    NotInitialized,

    /// Initialize called twice on the same client
    #[error("Client already initialized")]
    AlreadyInitialized,

    /// Tool ran and reported `isError: true`; the result is retained so the
    /// caller can inspect the payload alongside the failure
    #[error("Tool execution failed: {message}")]
    ToolFailed {
        /// First text block of the error result
        message: String,
        /// The full result the server returned
        result: Box<ToolCallResult>,
    },

    /// Required tools missing from a server's listing
    #[error("Missing required tools: {0:?}")]
    MissingTools(Vec<String>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure on the channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl McpError {
    /// The JSON-RPC code if this is an `Rpc` error.
    #[must_use]
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the server reported the tool itself as unknown.
    ///
    /// Servers signal this with `-32601` (method not found) or the
    /// server-defined `-32000` in the common case.
    #[must_use]
    pub fn is_tool_not_found(&self) -> bool {
        matches!(self.rpc_code(), Some(-32601) | Some(-32000))
    }
}
