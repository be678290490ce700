//! # animata-mcp
//!
//! MCP client core: connect to tool-providing MCP servers over subprocess
//! stdio or streamable HTTP, perform the protocol handshake, list tools, and
//! invoke them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 McpClient                   │
//! │   connect / initialize / list / call        │
//! └───────────────────┬─────────────────────────┘
//!                     │ Transport (trait)
//!        ┌────────────┴────────────┐
//!        ▼                         ▼
//! ┌──────────────┐         ┌──────────────┐
//! │ StdioTransport│        │ HttpTransport │
//! │ (child proc)  │        │ (SSE / JSON)  │
//! └──────────────┘         └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use animata_mcp::{connect_server, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::stdio(vec!["uvx".into(), "imagesorcery-mcp".into()])
//!         .require_tools(["detect", "fill"]);
//!
//!     let client = connect_server(&config, CancellationToken::new()).await?;
//!     let tools = client.list_tools().await?;
//!     println!("{} tools available", tools.len());
//!
//!     let result = client
//!         .call_tool("detect", Some(serde_json::json!({ "input_path": "/tmp/in.png" })))
//!         .await?;
//!     println!("{}", result.joined_text());
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod discovery;
mod error;
pub mod protocol;
pub mod transport;

pub use client::McpClient;
pub use config::{ServerConfig, TransportKind};
pub use discovery::{build_client, connect_server, validate_required};
pub use error::McpError;
pub use protocol::{ContentBlock, ServerInfo, Tool, ToolCallResult};
