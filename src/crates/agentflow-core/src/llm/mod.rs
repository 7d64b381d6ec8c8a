//! LLM client abstraction
//!
//! The engine is an orchestration framework, not an LLM client library.
//! This module defines the provider-agnostic surface the `client` and
//! `llm` nodes contract against:
//!
//! - [`Chat`] - the message container (system/user/assistant turns),
//! - [`ChatClient`] - the async generate/stream-generate trait,
//! - [`FakeClient`] - a scripted implementation for tests and offline runs,
//! - [`ClientRegistry`] - provider-name → builder dispatch used by the
//!   `client` node; provider crates register their builders here.

mod chat;
mod client;
mod fake;
mod registry;

pub use chat::{Chat, ChatMessage, Role};
pub use client::{ChatClient, ChatResult, ChunkStream, GenerateParams};
pub use fake::FakeClient;
pub use registry::{ClientBuilder, ClientRegistry};
