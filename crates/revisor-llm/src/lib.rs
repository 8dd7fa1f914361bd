//! Chat-model client used by Revisor's model-backed collaborators.
//!
//! Provides the `ProviderAdapter` trait, the `DynProvider` wrapper, a
//! middleware chain, an OpenAI-compatible chat-completions adapter (works with
//! OpenRouter), and `LlmClient` for routing requests by provider.

mod client;
mod json;
mod openai;
mod provider;
mod types;

pub use client::*;
pub use json::extract_json_object;
pub use openai::OpenAiChatAdapter;
pub use provider::*;
pub use types::*;
