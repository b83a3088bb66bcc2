//! Grammar errors
//!
//! Classification fails loudly: a node missing a key its shape needs reports
//! the shape and the key instead of an opaque lookup error. This upgrades the
//! source's behavior without widening what is accepted.

use thiserror::Error;

/// Result type for grammar operations
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Errors raised while classifying rule nodes
#[derive(Debug, Error)]
pub enum GrammarError {
    /// A node is not a mapping where one is required
    #[error("{grammar} node must be a mapping")]
    NotAMapping { grammar: &'static str },

    /// A shape-required key is absent
    #[error("missing required key \"{key}\" for shape {shape}")]
    MissingKey { shape: String, key: String },

    /// No candidate key matched the node
    #[error("unknown {grammar} shape: {detail}")]
    UnknownShape { grammar: &'static str, detail: String },

    /// The shape matched but its payload is malformed
    #[error("invalid {shape} node: {reason}")]
    Invalid { shape: String, reason: String },

    /// Payload deserialization failed after the shape was recognized
    #[error("malformed {shape} node: {source}")]
    Malformed {
        shape: String,
        #[source]
        source: serde_json::Error,
    },

    /// The rule document itself is not usable
    #[error("invalid rule document: {0}")]
    Document(String),
}

impl GrammarError {
    /// Shorthand for [`GrammarError::MissingKey`]
    pub fn missing(shape: impl Into<String>, key: impl Into<String>) -> Self {
        GrammarError::MissingKey {
            shape: shape.into(),
            key: key.into(),
        }
    }
}
