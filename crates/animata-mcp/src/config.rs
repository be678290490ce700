//! MCP server descriptors.
//!
//! Loading these from a config file, expanding environment variables and the
//! like is the embedding application's job; the core only consumes the
//! descriptor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_timeout() -> u64 {
    30_000
}

/// Transport type for an MCP server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Subprocess speaking newline-delimited JSON-RPC on stdio
    Stdio,
    /// Streamable HTTP endpoint
    Http,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command and arguments (stdio transport)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Endpoint URL (HTTP transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP headers, applied verbatim (bearer tokens included)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Tools this application cannot run without
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_tools: Vec<String>,
}

impl ServerConfig {
    /// Create a stdio server config.
    #[must_use]
    pub fn stdio(command: Vec<String>) -> Self {
        Self {
            command,
            url: None,
            headers: HashMap::new(),
            timeout_ms: default_timeout(),
            required_tools: Vec::new(),
        }
    }

    /// Create an HTTP server config.
    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            command: Vec::new(),
            url: Some(url.into()),
            headers: HashMap::new(),
            timeout_ms: default_timeout(),
            required_tools: Vec::new(),
        }
    }

    /// Add an HTTP header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Declare tools the application requires from this server.
    #[must_use]
    pub fn require_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Determine the transport kind from the descriptor.
    ///
    /// A URL means HTTP; otherwise stdio.
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        if self.url.is_some() {
            TransportKind::Http
        } else {
            TransportKind::Stdio
        }
    }
}
