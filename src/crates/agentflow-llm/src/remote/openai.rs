//! OpenAI-compatible chat-completions client.
//!
//! Speaks the `/chat/completions` dialect shared by OpenAI and the many
//! providers that mirror it (OpenRouter, Together, local gateways).
//! Streaming uses the SSE framing of that API: `data: {json}` lines
//! terminated by `data: [DONE]`.

use agentflow_core::{
    Chat, ChatChunk, ChatClient, ChatResult, ChunkStream, GenerateParams, Role,
    Result as FlowResult,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RemoteClientConfig;
use crate::error::LlmError;

#[derive(Clone)]
pub struct OpenAiCompatClient {
    config: RemoteClientConfig,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(config: RemoteClientConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn request_body(&self, chat: &Chat, params: &GenerateParams, stream: bool) -> WireRequest {
        WireRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| self.config.model.clone()),
            messages: chat
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    }
                    .to_string(),
                    content: Some(m.content.clone()),
                })
                .collect(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request.header(
            "Authorization",
            format!("Bearer {}", self.config.api_key),
        );
        if let Some(org) = &self.config.organization {
            request = request.header("OpenAI-Organization", org);
        }
        request
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 => LlmError::Authentication(body),
            429 => LlmError::RateLimit(body),
            _ => LlmError::Provider(format!("status {}: {}", status, body)),
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn generate(&self, chat: &Chat, params: &GenerateParams) -> FlowResult<ChatResult> {
        let url = format!("{}/chat/completions", self.config.base_url);
        tracing::debug!(url = %url, model = %self.config.model, "chat completion request");

        let response = self
            .authorized(self.client.post(&url))
            .json(&self.request_body(chat, params, false))
            .send()
            .await
            .map_err(LlmError::Http)?;
        let response = Self::check_status(response).await?;

        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = body
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        Ok(ChatResult {
            content: choice.message.content.clone().unwrap_or_default(),
            model: body.model,
            extras: None,
        })
    }

    async fn stream_generate(&self, chat: &Chat, params: &GenerateParams) -> FlowResult<ChunkStream> {
        let url = format!("{}/chat/completions", self.config.base_url);
        tracing::debug!(url = %url, model = %self.config.model, "streaming chat completion");

        let response = self
            .authorized(self.client.post(&url))
            .json(&self.request_body(chat, params, true))
            .send()
            .await
            .map_err(LlmError::Http)?;
        let response = Self::check_status(response).await?;

        let model = self.config.model.clone();
        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut done = false;
            while let Some(piece) = bytes.next().await {
                let piece = match piece {
                    Ok(piece) => piece,
                    Err(e) => {
                        yield Err(LlmError::Http(e).into());
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&piece));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        done = true;
                        break;
                    }
                    match parse_chunk(data) {
                        Some(chunk) => yield Ok(chunk),
                        None => {
                            yield Err(LlmError::InvalidResponse(
                                format!("unparseable stream line: {}", data),
                            )
                            .into());
                            return;
                        }
                    }
                }
                if done {
                    break;
                }
            }
            yield Ok(ChatChunk::finish(model.clone()));
        };
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        &self.config.model
    }

    fn clone_box(&self) -> Box<dyn ChatClient> {
        Box::new(self.clone())
    }
}

fn parse_chunk(data: &str) -> Option<ChatChunk> {
    let value: Value = serde_json::from_str(data).ok()?;
    serde_json::from_value::<ChatChunk>(value).ok()
}

// Wire types for the chat-completions dialect.

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[cfg(test)]
impl WireMessage {
    fn content_or_default(&self) -> String {
        self.content.clone().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_request_messages_in_role_order() {
        let client = OpenAiCompatClient::new(RemoteClientConfig::new(
            "test-key",
            "https://api.openai.com/v1",
            "gpt-4o-mini",
        ))
        .unwrap();

        let chat = Chat::new().system("be terse").user("hi");
        let body = client.request_body(&chat, &GenerateParams::default(), false);
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[1].content_or_default(), "hi");
        assert!(!body.stream);
    }

    #[test]
    fn parses_a_stream_data_line() {
        let chunk = parse_chunk(
            r#"{"id":"c1","model":"gpt-4o-mini",
                "choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.text(), Some("Hel"));
    }

    #[test]
    fn param_model_overrides_config_model() {
        let client = OpenAiCompatClient::new(RemoteClientConfig::new(
            "test-key",
            "https://api.openai.com/v1",
            "gpt-4o-mini",
        ))
        .unwrap();
        let params = GenerateParams {
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        let body = client.request_body(&Chat::new().user("hi"), &params, true);
        assert_eq!(body.model, "gpt-4o");
    }
}
