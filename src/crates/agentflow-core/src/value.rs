//! Values routed between nodes
//!
//! Almost everything that travels along an edge is JSON, but a `client`
//! node produces a live LLM client handle that downstream `llm` nodes
//! invoke. [`FlowValue`] keeps both worlds in one routable type: a JSON arm
//! for data and a shared opaque arm for the client. The client arm is
//! shared-read (`Arc`); nodes never mutate it.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::llm::ChatClient;

/// A value bound to a node input or recorded as a node output.
#[derive(Clone)]
pub enum FlowValue {
    /// Plain JSON data.
    Json(Value),
    /// A shared LLM client handle produced by a `client` node.
    Client(Arc<dyn ChatClient>),
}

impl FlowValue {
    /// Wrap a JSON value.
    pub fn json(value: impl Into<Value>) -> Self {
        Self::Json(value.into())
    }

    /// Wrap a string.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Json(Value::String(s.into()))
    }

    /// Borrow the JSON arm, if this is data.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Client(_) => None,
        }
    }

    /// Borrow the string content, if this is a JSON string.
    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(Value::as_str)
    }

    /// Clone out the client handle, if this is a client.
    pub fn as_client(&self) -> Option<Arc<dyn ChatClient>> {
        match self {
            Self::Json(_) => None,
            Self::Client(c) => Some(c.clone()),
        }
    }

    /// JSON representation for debug capture. The client arm is opaque and
    /// snapshots as a placeholder string.
    pub fn snapshot(&self) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Client(c) => Value::String(format!("<client:{}>", c.name())),
        }
    }

    /// Render the value as display text. JSON strings render bare (no
    /// quotes); other JSON renders compact.
    pub fn display_text(&self) -> String {
        match self {
            Self::Json(Value::String(s)) => s.clone(),
            Self::Json(v) => v.to_string(),
            Self::Client(c) => format!("<client:{}>", c.name()),
        }
    }
}

impl fmt::Debug for FlowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => write!(f, "Json({})", v),
            Self::Client(c) => write!(f, "Client({})", c.name()),
        }
    }
}

impl From<Value> for FlowValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for FlowValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}
