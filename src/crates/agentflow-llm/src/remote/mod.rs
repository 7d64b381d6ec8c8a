//! Remote provider implementations.

mod openai;

pub use openai::OpenAiCompatClient;
