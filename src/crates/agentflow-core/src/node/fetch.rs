//! HTTP fetch node.
//!
//! Renders the configured URL template against the node's inputs, makes
//! the request, and emits the JSON response on the terminal output.
//! Timeouts are the caller's concern via configuration; failures surface
//! as transport or data errors on the debug stream.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};
use crate::event::Event;
use crate::template;
use crate::value::FlowValue;

use super::{EventSender, FlowNode, InvokeContext, NodeBase};

pub struct FetchNode {
    base: NodeBase,
}

impl FetchNode {
    pub fn new(id: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            base: NodeBase::new(id, "fetch", config),
        }
    }

    fn method(&self) -> reqwest::Method {
        match self
            .base
            .config_str("method")
            .unwrap_or("GET")
            .to_ascii_uppercase()
            .as_str()
        {
            "POST" => reqwest::Method::POST,
            "PUT" => reqwest::Method::PUT,
            "PATCH" => reqwest::Method::PATCH,
            "DELETE" => reqwest::Method::DELETE,
            _ => reqwest::Method::GET,
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.base
            .config
            .get("headers")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl FlowNode for FetchNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    async fn run(&mut self, ctx: &InvokeContext, emit: EventSender) -> Result<()> {
        let url_template = self.base.require_config_str("url")?.to_string();
        let context = template::flat_context(&self.base.inputs);
        let url = template::render(&url_template, &context)?;

        let timeout = self
            .base
            .config
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(30_000);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout))
            .build()?;

        let mut request = client.request(self.method(), &url);
        for (name, value) in self.headers() {
            request = request.header(name, value);
        }
        if let Some(body) = self.base.config.get("json") {
            request = request.json(body);
        } else if let Some(body) = self.base.config_str("body") {
            request = request.body(body.to_string());
        }

        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(FlowError::Cancelled),
            res = request.send() => res?,
        };
        let status = response.status();
        if !status.is_success() {
            return Err(FlowError::Transport(format!(
                "{} returned status {}",
                url, status
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| FlowError::Data(format!("response is not JSON: {}", e)))?;

        let _ = emit
            .send(Event::end(&self.base.id, FlowValue::json(body)))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ClientRegistry;
    use crate::node::invoke;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn url_template_failure_reports_available_keys() {
        let (tx, _rx) = mpsc::channel(8);
        let ctx = InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()));
        let mut config = Map::new();
        config.insert(
            "url".to_string(),
            json!("https://example.invalid/{{ user_id }}"),
        );
        let mut node: Box<dyn FlowNode> = Box::new(FetchNode::new("f", config));

        let outcome = invoke(&mut node, &ctx).await;
        match outcome.error.unwrap() {
            FlowError::Template { template, .. } => {
                assert!(template.contains("user_id"));
            }
            other => panic!("expected template error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_url_is_a_config_error() {
        let (tx, _rx) = mpsc::channel(8);
        let ctx = InvokeContext::new(tx, Arc::new(ClientRegistry::with_defaults()));
        let mut node: Box<dyn FlowNode> = Box::new(FetchNode::new("f", Map::new()));

        let outcome = invoke(&mut node, &ctx).await;
        assert_eq!(outcome.error.unwrap().kind(), "config");
    }
}
