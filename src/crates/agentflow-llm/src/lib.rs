//! LLM provider implementations for agentflow.
//!
//! `agentflow-core` defines the [`ChatClient`] trait and ships only the
//! scripted fake; this crate provides real providers and plugs them into
//! the core's [`ClientRegistry`] so `client` nodes can name them:
//!
//! ```rust,ignore
//! use agentflow_core::ClientRegistry;
//!
//! let mut registry = ClientRegistry::with_defaults();
//! agentflow_llm::register_providers(&mut registry);
//! // specs can now use {"type": "client", "data": {"provider": "openai", …}}
//! ```
//!
//! Currently implemented: the OpenAI-compatible chat-completions dialect
//! (`openai` provider), which also covers OpenRouter, Together, and local
//! gateways exposing the same API.

pub mod config;
pub mod error;
pub mod remote;

pub use config::RemoteClientConfig;
pub use error::{LlmError, Result};
pub use remote::OpenAiCompatClient;

// Re-export core types for convenience
pub use agentflow_core::{Chat, ChatClient, ChatResult, ClientRegistry, GenerateParams};

use std::sync::Arc;

/// Register every provider in this crate.
pub fn register_providers(registry: &mut ClientRegistry) {
    registry.register("openai", |config| {
        let remote = RemoteClientConfig::from_node_config(config)?;
        let client = OpenAiCompatClient::new(remote)?;
        Ok(Arc::new(client) as Arc<dyn ChatClient>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_the_openai_provider() {
        let mut registry = ClientRegistry::with_defaults();
        register_providers(&mut registry);
        let mut providers = registry.providers();
        providers.sort();
        assert_eq!(providers, vec!["fake", "openai"]);
    }
}
