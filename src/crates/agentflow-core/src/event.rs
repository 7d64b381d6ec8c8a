//! Typed events produced by nodes
//!
//! A node invocation produces a finite, ordered sequence of [`Event`]s.
//! Each event carries a `source_type` - the output handle it was emitted
//! on - and a payload naming the producer. Edges match on `source_type` to
//! route the payload into downstream inputs.
//!
//! Two source types are special:
//!
//! - [`SOURCE_CONTENT`] - user-visible streaming chunks, forwarded to the
//!   caller in production order while the node runs.
//! - [`SOURCE_END`] (alias [`SOURCE_DEFAULT`]) - the canonical terminal
//!   event; exactly one per invocation.

use crate::value::FlowValue;

/// Canonical terminal source type.
pub const SOURCE_END: &str = "end";

/// Accepted alias for [`SOURCE_END`].
pub const SOURCE_DEFAULT: &str = "default";

/// Reserved source type for user-visible streaming chunks and per-loop
/// iteration items.
pub const SOURCE_CONTENT: &str = "content";

/// Reserved target key for the auto-inserted sink node.
pub const VOID_KEY: &str = "void";

/// Returns true for the terminal source type or its alias.
pub fn is_terminal_type(source_type: &str) -> bool {
    source_type == SOURCE_END || source_type == SOURCE_DEFAULT
}

/// Edge/event source-type matching, treating `end` and `default` as equal.
pub fn source_types_match(edge_type: &str, event_type: &str) -> bool {
    edge_type == event_type || (is_terminal_type(edge_type) && is_terminal_type(event_type))
}

/// Payload of an event: the producing node and the routed value.
#[derive(Debug, Clone)]
pub struct EventPayload {
    /// Id of the node that produced the event.
    pub producer_id: String,
    /// The routed value.
    pub value: FlowValue,
}

/// A typed event emitted by a node.
#[derive(Debug, Clone)]
pub struct Event {
    /// Output handle the event was emitted on.
    pub source_type: String,
    /// Producer id plus value.
    pub payload: EventPayload,
}

impl Event {
    /// Create an event with an explicit source type.
    pub fn typed(
        source_type: impl Into<String>,
        producer_id: impl Into<String>,
        value: FlowValue,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            payload: EventPayload {
                producer_id: producer_id.into(),
                value,
            },
        }
    }

    /// Create the canonical terminal event.
    pub fn end(producer_id: impl Into<String>, value: FlowValue) -> Self {
        Self::typed(SOURCE_END, producer_id, value)
    }

    /// Create a user-visible content event.
    pub fn content(producer_id: impl Into<String>, value: FlowValue) -> Self {
        Self::typed(SOURCE_CONTENT, producer_id, value)
    }

    /// True if this is a streaming content event.
    pub fn is_content(&self) -> bool {
        self.source_type == SOURCE_CONTENT
    }

    /// True if this is the terminal event (or its alias).
    pub fn is_terminal(&self) -> bool {
        is_terminal_type(&self.source_type)
    }
}
