//! LLM orchestration error types.

use thiserror::Error;

/// The safety bound an agent conversation ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Conversation round cap
    Rounds,
    /// Cumulative token cap
    Tokens,
    /// Cost cap in USD
    Cost,
    /// Wall-clock timeout
    WallClock,
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rounds => "rounds",
            Self::Tokens => "tokens",
            Self::Cost => "cost",
            Self::WallClock => "wall clock",
        };
        f.write_str(name)
    }
}

/// Errors that can occur driving a model or the tool layer.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider endpoint unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider returned an API-level error
    #[error("API error: {0}")]
    Api(String),

    /// Provider response did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Image could not be read or encoded
    #[error("Image error: {0}")]
    Image(String),

    /// A conversation safety bound was exceeded
    #[error("Conversation exceeded {bound} limit: {detail}")]
    BudgetExceeded {
        /// Which bound was hit
        bound: Bound,
        /// Human-readable detail (value vs. cap)
        detail: String,
    },

    /// The model ran out of tokens mid-turn
    #[error("Model response truncated: hit max tokens at round {round}")]
    Truncated {
        /// Round at which truncation happened
        round: u32,
    },

    /// The model stopped without text or tool calls
    #[error("Model made no progress: empty response at round {round}")]
    NoProgress {
        /// Round at which the empty turn happened
        round: u32,
    },

    /// A qualified tool name did not contain the separator
    #[error("Invalid tool name {0:?}: expected server__tool")]
    BadToolName(String),

    /// A qualified tool name referenced an unknown server
    #[error("MCP server not found: {0}")]
    UnknownServer(String),

    /// Tool ran but reported failure, or returned nothing usable
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Configured provider name is not recognized
    #[error("Unsupported LLM provider: {0} (supported: anthropic, google, openai)")]
    UnknownProvider(String),

    /// Ambient cancellation fired
    #[error("Conversation cancelled")]
    Cancelled,

    /// Failure from the MCP layer, propagated verbatim
    #[error(transparent)]
    Mcp(#[from] animata_mcp::McpError),

    /// HTTP failure talking to a provider
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LlmError {
    /// The bound this error names, if it is a budget failure.
    #[must_use]
    pub fn exceeded_bound(&self) -> Option<Bound> {
        match self {
            Self::BudgetExceeded { bound, .. } => Some(*bound),
            _ => None,
        }
    }
}
