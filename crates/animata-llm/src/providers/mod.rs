//! Concrete provider adapters.
//!
//! Each module owns every provider-specific detail: endpoint, auth headers,
//! message shapes, tool/function declaration format, and stop-reason
//! vocabulary. Nothing provider-specific leaks past this boundary.

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
