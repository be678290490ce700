//! Transport layer: bidirectional JSON-RPC 2.0 channels to MCP servers.
//!
//! Two implementations share one contract: [`StdioTransport`] spawns the
//! server as a child process and frames one JSON object per line;
//! [`HttpTransport`] speaks streamable HTTP where responses may arrive as a
//! plain JSON body or as server-sent events. [`MockTransport`] is the
//! scripted stand-in used by tests throughout the workspace.

mod http;
mod mock;
mod stdio;

pub use http::HttpTransport;
pub use mock::MockTransport;
pub use stdio::StdioTransport;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpError;

/// A JSON-RPC channel to one MCP server.
///
/// Request ids are allocated monotonically per transport and never reused
/// within a session. Once closed, a transport is terminal.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync {
    /// Bring the channel up.
    ///
    /// # Errors
    /// Returns [`McpError::Setup`] when the process cannot be spawned or the
    /// session cannot be established.
    async fn start(&self) -> Result<(), McpError>;

    /// Send a request and wait for the correlated response.
    ///
    /// Blocks until the matching response arrives, the per-request timeout
    /// fires, or the ambient cancellation token is cancelled. A timeout is a
    /// request failure, not a transport failure: other pending calls are
    /// unaffected.
    ///
    /// # Errors
    /// [`McpError::Rpc`] when the server returns a JSON-RPC error (code
    /// preserved), [`McpError::Timeout`], [`McpError::Cancelled`], or
    /// [`McpError::Closed`] when the channel dies mid-flight.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a notification; fire-and-forget, no id, no reply.
    ///
    /// # Errors
    /// Returns an error only when the frame cannot be written.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// Best-effort graceful shutdown.
    ///
    /// Releases every resource tied to the channel; for stdio that means
    /// closing the child's stdin, waiting up to five seconds, then killing.
    ///
    /// # Errors
    /// Returns an error when the underlying resources cannot be released.
    async fn close(&self) -> Result<(), McpError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn start(&self) -> Result<(), McpError> {
        (**self).start().await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        (**self).request(method, params).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        (**self).notify(method, params).await
    }

    async fn close(&self) -> Result<(), McpError> {
        (**self).close().await
    }
}
