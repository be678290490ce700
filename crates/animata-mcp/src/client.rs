//! MCP client: handshake, tool listing, tool invocation over one transport.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::McpError;
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, ListToolsResult, ServerInfo, Tool,
    ToolCallResult,
};
use crate::transport::Transport;

/// Client for a single MCP server.
///
/// Wraps one [`Transport`] and enforces the protocol lifecycle: `connect`,
/// then `initialize` exactly once, then tool operations. Calling a tool
/// operation before the handshake is a programming error and fails eagerly
/// with [`McpError::NotInitialized`].
#[derive(Debug)]
pub struct McpClient {
    transport: Box<dyn Transport>,
    initialized: AtomicBool,
    server_info: Mutex<Option<ServerInfo>>,
}

impl McpClient {
    /// Create a client over the given transport.
    #[must_use]
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            initialized: AtomicBool::new(false),
            server_info: Mutex::new(None),
        }
    }

    /// Bring the underlying transport up.
    ///
    /// # Errors
    /// Returns [`McpError::Setup`] when the channel cannot be established.
    pub async fn connect(&self) -> Result<(), McpError> {
        self.transport.start().await
    }

    /// Perform the MCP initialization handshake.
    ///
    /// Sends `initialize`, records the server's identity and capabilities,
    /// then sends the `notifications/initialized` notification. Not
    /// idempotent: a second call fails with [`McpError::AlreadyInitialized`].
    ///
    /// # Errors
    /// Propagates transport and JSON-RPC failures from the handshake.
    pub async fn initialize(&self) -> Result<(), McpError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Err(McpError::AlreadyInitialized);
        }

        let params = serde_json::to_value(InitializeParams::current())?;
        let result = self.transport.request("initialize", Some(params)).await?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid initialize result: {e}")))?;

        debug!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            "MCP handshake complete"
        );
        *self.server_info.lock().await = Some(init.server_info);

        self.transport
            .notify("notifications/initialized", None)
            .await?;

        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), McpError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(McpError::NotInitialized)
        }
    }

    /// Retrieve the server's tool listing.
    ///
    /// The `nextCursor` field is observed but not followed; servers in this
    /// deployment return their full inventory in one page.
    ///
    /// # Errors
    /// Fails before the handshake, and propagates transport failures.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        self.ensure_initialized()?;

        let result = self.transport.request("tools/list", Some(json!({}))).await?;
        let listing: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid tools/list result: {e}")))?;

        if listing.next_cursor.is_some() {
            debug!("tools/list returned a cursor; further pages not fetched");
        }

        Ok(listing.tools)
    }

    /// Invoke a tool.
    ///
    /// JSON-RPC errors are propagated with their numeric code intact. A
    /// result flagged `isError` is surfaced as [`McpError::ToolFailed`]
    /// *carrying the full result*, so the payload is never silently lost and
    /// naive callers cannot mistake it for success.
    ///
    /// # Errors
    /// Fails before the handshake; otherwise per the rules above.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<ToolCallResult, McpError> {
        self.ensure_initialized()?;

        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;

        let result = self.transport.request("tools/call", Some(params)).await?;
        let call_result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("invalid tools/call result: {e}")))?;

        if call_result.is_error {
            let message = call_result
                .first_text()
                .unwrap_or("tool reported an error without details")
                .to_string();
            return Err(McpError::ToolFailed {
                message,
                result: Box::new(call_result),
            });
        }

        Ok(call_result)
    }

    /// Identity the server declared during the handshake.
    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.lock().await.clone()
    }

    /// Shut the transport down.
    ///
    /// # Errors
    /// Propagates resource-release failures from the transport.
    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.close().await
    }
}
