//! Error types for graph compilation and execution
//!
//! All failures inside the engine are represented by [`FlowError`]. The
//! executor never lets one escape: every error raised by a node or by the
//! scheduler is converted into a structured debug record and yielded into
//! the output stream, and execution continues (affected subtrees stall on
//! their missing inputs).
//!
//! # Error Hierarchy
//!
//! ```text
//! FlowError
//! ├── Spec           - Validation failures (missing entry, duplicate edges)
//! ├── Config         - Malformed node configuration
//! ├── Input          - Required input absent at execution time
//! ├── Template       - Template render failures (with template + keys)
//! ├── Transport      - HTTP / LLM call failures
//! ├── Data           - JSON parse or shape mismatches
//! ├── Routing        - Conditional selected a branch with no matching edge
//! ├── Deadlock       - Scheduler made no progress with edges pending
//! ├── Cancelled      - Execution cancelled by the caller
//! ├── Serialization  - serde_json errors
//! └── Http           - reqwest errors
//! ```

use thiserror::Error;

/// Convenience result type using [`FlowError`].
pub type Result<T> = std::result::Result<T, FlowError>;

/// Error raised during graph compilation or execution.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Graph specification failed validation.
    #[error("spec validation failed: {message}")]
    Spec {
        /// Human-readable description of the rule violation
        message: String,
        /// Ids of the offending nodes or edges
        offenders: Vec<String>,
    },

    /// A node's configuration is malformed or incomplete.
    #[error("node '{node}' configuration invalid: {message}")]
    Config { node: String, message: String },

    /// A required input was not provided at execution time.
    #[error("node '{node}' missing required input '{key}'")]
    Input { node: String, key: String },

    /// A template failed to render.
    ///
    /// Carries the offending template and the keys that were available in
    /// the render context so the failure is diagnosable from the debug
    /// stream alone.
    #[error("template render failed: {message}")]
    Template {
        message: String,
        template: String,
        available_keys: Vec<String>,
    },

    /// An HTTP or LLM call failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A JSON parse or type check failed.
    #[error("data error: {0}")]
    Data(String),

    /// A conditional rendered a branch name that matches no outgoing edge.
    #[error("conditional '{node}' routed to unknown branch '{branch}'")]
    Routing { node: String, branch: String },

    /// The scheduler made no progress while edges remained pending.
    #[error("no progress with {remaining} edge(s) pending")]
    Deadlock { remaining: usize },

    /// Execution was cancelled by the caller.
    #[error("execution cancelled")]
    Cancelled,

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FlowError {
    /// Create a spec validation error with offender ids.
    pub fn spec(message: impl Into<String>, offenders: Vec<String>) -> Self {
        Self::Spec {
            message: message.into(),
            offenders,
        }
    }

    /// Create a node configuration error.
    pub fn config(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a missing-input error.
    pub fn input(node: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Input {
            node: node.into(),
            key: key.into(),
        }
    }

    /// Create a template error carrying the template text and the context
    /// keys that were available when rendering failed.
    pub fn template(
        message: impl Into<String>,
        template: impl Into<String>,
        available_keys: Vec<String>,
    ) -> Self {
        Self::Template {
            message: message.into(),
            template: template.into(),
            available_keys,
        }
    }

    /// Create a routing error for a conditional branch miss.
    pub fn routing(node: impl Into<String>, branch: impl Into<String>) -> Self {
        Self::Routing {
            node: node.into(),
            branch: branch.into(),
        }
    }

    /// Short machine-readable tag for the error kind, used in debug records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spec { .. } => "spec",
            Self::Config { .. } => "config",
            Self::Input { .. } => "input",
            Self::Template { .. } => "template",
            Self::Transport(_) | Self::Http(_) => "transport",
            Self::Data(_) => "data",
            Self::Routing { .. } => "routing",
            Self::Deadlock { .. } => "deadlock",
            Self::Cancelled => "cancelled",
            Self::Serialization(_) => "serialization",
        }
    }
}
