//! Provider-name → client-builder dispatch.
//!
//! A `client` node names a provider in its configuration; at execution
//! time it asks the registry to build the client. The `"fake"` provider is
//! built in; provider crates register theirs on top:
//!
//! ```rust,ignore
//! let mut registry = ClientRegistry::with_defaults();
//! agentflow_llm::register_providers(&mut registry);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{FlowError, Result};

use super::{ChatClient, FakeClient};

/// Builds a client from a `client` node's configuration map.
pub type ClientBuilder =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Arc<dyn ChatClient>> + Send + Sync>;

/// Registry of chat client providers.
#[derive(Clone)]
pub struct ClientRegistry {
    builders: HashMap<String, ClientBuilder>,
}

impl ClientRegistry {
    /// Empty registry with no providers.
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry with the built-in `"fake"` provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("fake", |config| {
            Ok(Arc::new(FakeClient::from_config(config)) as Arc<dyn ChatClient>)
        });
        registry
    }

    /// Register (or replace) a provider builder.
    pub fn register<F>(&mut self, provider: impl Into<String>, builder: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Arc<dyn ChatClient>> + Send + Sync + 'static,
    {
        self.builders.insert(provider.into(), Arc::new(builder));
    }

    /// Build a client for the named provider.
    pub fn build(&self, provider: &str, config: &Map<String, Value>) -> Result<Arc<dyn ChatClient>> {
        match self.builders.get(provider) {
            Some(builder) => builder(config),
            None => Err(FlowError::config(
                provider,
                format!("unknown client provider '{}'", provider),
            )),
        }
    }

    /// Registered provider names.
    pub fn providers(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
