//! Server bring-up helpers: descriptor → connected client, required-tool
//! validation.

use tokio_util::sync::CancellationToken;

use crate::client::McpClient;
use crate::config::{ServerConfig, TransportKind};
use crate::error::McpError;
use crate::protocol::Tool;
use crate::transport::{HttpTransport, StdioTransport};

/// Check that every required tool appears in a server's listing.
///
/// # Errors
/// Returns [`McpError::MissingTools`] naming each absent tool.
pub fn validate_required(available: &[Tool], required: &[String]) -> Result<(), McpError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !available.iter().any(|tool| &tool.name == *name))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(McpError::MissingTools(missing))
    }
}

/// Build a client from a server descriptor, without connecting.
///
/// # Errors
/// Returns [`McpError::Setup`] when the descriptor is incomplete for its
/// transport kind.
pub fn build_client(config: &ServerConfig, cancel: CancellationToken) -> Result<McpClient, McpError> {
    let client = match config.transport_kind() {
        TransportKind::Stdio => {
            if config.command.is_empty() {
                return Err(McpError::Setup(
                    "command required for stdio transport".to_string(),
                ));
            }
            McpClient::new(Box::new(
                StdioTransport::new(config.command.clone(), config.timeout_ms)
                    .with_cancellation(cancel),
            ))
        }
        TransportKind::Http => {
            let url = config
                .url
                .as_ref()
                .ok_or_else(|| McpError::Setup("url required for http transport".to_string()))?;
            McpClient::new(Box::new(
                HttpTransport::new(url, config.headers.clone(), config.timeout_ms)
                    .with_cancellation(cancel),
            ))
        }
    };

    Ok(client)
}

/// Connect, initialize, and validate a server in one step.
///
/// # Errors
/// Propagates setup and handshake failures; returns
/// [`McpError::MissingTools`] when the descriptor's `required_tools` are not
/// all present.
pub async fn connect_server(
    config: &ServerConfig,
    cancel: CancellationToken,
) -> Result<McpClient, McpError> {
    let client = build_client(config, cancel)?;
    client.connect().await?;
    client.initialize().await?;

    if !config.required_tools.is_empty() {
        let tools = client.list_tools().await?;
        validate_required(&tools, &config.required_tools)?;
    }

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: format!("{name} description"),
            input_schema: Value::Object(serde_json::Map::new()),
        }
    }

    #[test]
    fn validation_passes_when_all_present() {
        let available = vec![tool("toolA"), tool("toolB")];
        let required = vec!["toolA".to_string(), "toolB".to_string()];
        assert!(validate_required(&available, &required).is_ok());
    }

    #[test]
    fn validation_names_the_missing_tool() {
        let available = vec![tool("toolA"), tool("toolB")];
        let required = vec!["toolA".to_string(), "toolC".to_string()];

        let err = validate_required(&available, &required).unwrap_err();
        match err {
            McpError::MissingTools(missing) => assert_eq!(missing, vec!["toolC".to_string()]),
            other => panic!("expected MissingTools, got {other:?}"),
        }
    }

    #[test]
    fn stdio_descriptor_without_command_is_rejected() {
        let config = ServerConfig::stdio(vec![]);
        let err = build_client(&config, CancellationToken::new()).unwrap_err();
        assert!(matches!(err, McpError::Setup(_)));
    }

    #[test]
    fn descriptors_build_matching_transports() {
        let stdio = ServerConfig::stdio(vec!["uvx".into(), "imagesorcery-mcp".into()]);
        assert!(build_client(&stdio, CancellationToken::new()).is_ok());

        let http = ServerConfig::http("https://mcp.example.com/mcp");
        assert!(build_client(&http, CancellationToken::new()).is_ok());
    }
}
