//! Per-execution identity record
//!
//! One [`ChatLog`] exists per graph invocation. The master entry node
//! assigns it on first execution; afterwards it is read-only and threaded
//! through every node via the invocation context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one execution: the conversation and the thread within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLog {
    /// Conversation identifier.
    pub chat_id: String,
    /// Thread identifier within the conversation.
    pub thread_id: String,
}

impl ChatLog {
    /// Generate a fresh chat log with random ids.
    pub fn new() -> Self {
        Self {
            chat_id: Uuid::new_v4().to_string(),
            thread_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_logs_are_distinct() {
        let a = ChatLog::new();
        let b = ChatLog::new();
        assert_ne!(a.chat_id, b.chat_id);
        assert_ne!(a.thread_id, b.thread_id);
    }
}
