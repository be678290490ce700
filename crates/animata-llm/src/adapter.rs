//! Tool adapter: one flat tool namespace over N MCP clients.
//!
//! Tools are renamed `{server}__{tool}` so two servers exposing the same
//! bare name never collide; the adapter routes invocations back to the
//! owning client and flattens results to text for the model.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use animata_mcp::{McpClient, McpError};

use crate::error::LlmError;
use crate::types::UnifiedTool;

/// Separator between server and tool in a qualified name.
pub const SEPARATOR: &str = "__";

/// Build a qualified tool name.
#[must_use]
pub fn qualify(server: &str, tool: &str) -> String {
    format!("{server}{SEPARATOR}{tool}")
}

/// Split a qualified name at the *first* separator occurrence.
///
/// # Errors
/// Returns [`LlmError::BadToolName`] when no separator is present.
pub fn split_qualified(name: &str) -> Result<(&str, &str), LlmError> {
    name.split_once(SEPARATOR)
        .ok_or_else(|| LlmError::BadToolName(name.to_string()))
}

/// Unifies tools from many MCP servers into one namespace.
///
/// Read-many once [`discover`](Self::discover) has memoized; holds client
/// handles and references nothing back into the orchestration layer.
pub struct ToolAdapter {
    clients: BTreeMap<String, Arc<McpClient>>,
    cache: Mutex<Option<Vec<UnifiedTool>>>,
}

impl ToolAdapter {
    /// Create an adapter over clients keyed by server name.
    ///
    /// Server names must not contain the separator; qualified names would
    /// not round-trip otherwise.
    #[must_use]
    pub fn new(clients: BTreeMap<String, Arc<McpClient>>) -> Self {
        Self {
            clients,
            cache: Mutex::new(None),
        }
    }

    /// Discover every server's tools, renamed into the unified namespace.
    ///
    /// Memoized for the life of the adapter. A server whose listing fails is
    /// skipped with a warning; the remaining servers' tools stay available.
    pub async fn discover(&self) -> Vec<UnifiedTool> {
        let mut cache = self.cache.lock().await;
        if let Some(tools) = cache.as_ref() {
            return tools.clone();
        }

        let mut unified = Vec::new();
        for (server, client) in &self.clients {
            match client.list_tools().await {
                Ok(tools) => {
                    debug!(server = %server, count = tools.len(), "discovered tools");
                    for tool in tools {
                        unified.push(UnifiedTool {
                            name: qualify(server, &tool.name),
                            description: format!("[{server}] {}", tool.description),
                            parameters: tool.input_schema,
                        });
                    }
                }
                Err(err) => {
                    warn!(server = %server, error = %err, "tool discovery failed, skipping server");
                }
            }
        }

        debug!(total = unified.len(), "unified tool namespace built");
        *cache = Some(unified.clone());
        unified
    }

    /// Execute a qualified tool call and flatten the result to text.
    ///
    /// # Errors
    /// [`LlmError::BadToolName`] / [`LlmError::UnknownServer`] for routing
    /// failures, [`LlmError::ToolExecution`] when the tool reports an error
    /// or returns no content; transport failures propagate verbatim.
    pub async fn execute(&self, qualified_name: &str, arguments: Value) -> Result<String, LlmError> {
        let (server, tool) = split_qualified(qualified_name)?;

        let client = self
            .clients
            .get(server)
            .ok_or_else(|| LlmError::UnknownServer(server.to_string()))?;

        debug!(server = %server, tool = %tool, "executing tool call");

        let result = match client.call_tool(tool, Some(arguments)).await {
            Ok(result) => result,
            Err(McpError::ToolFailed { message, .. }) => {
                return Err(LlmError::ToolExecution(message));
            }
            Err(other) => return Err(other.into()),
        };

        if result.content.is_empty() {
            return Err(LlmError::ToolExecution(format!(
                "{qualified_name} returned no content"
            )));
        }

        let text = result.joined_text();
        debug!(tool = %qualified_name, bytes = text.len(), "tool call complete");
        Ok(text)
    }

    /// Human-readable tool inventory grouped by server, for the system
    /// prompt.
    pub async fn describe(&self) -> String {
        let tools = self.discover().await;
        if tools.is_empty() {
            return "No tools available".to_string();
        }

        let mut by_server: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for tool in &tools {
            if let Ok((server, name)) = split_qualified(&tool.name) {
                by_server.entry(server).or_default().push(name);
            }
        }

        let mut out = format!("You have access to {} tools from MCP servers:\n\n", tools.len());
        for (server, names) in by_server {
            let _ = writeln!(out, "**{server}**:");
            for name in names {
                let _ = writeln!(out, "  - {name}");
            }
            out.push('\n');
        }
        out
    }
}
