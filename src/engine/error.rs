//! Error types for the engine.
//!
//! Errors inside a single rule never abort the policy driver; they become
//! an Error rule response and the driver continues with the next rule.

use thiserror::Error;

/// Error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// A JMESPath query resolved to nothing. Non-fatal when loading a
    /// `variable` context entry; an error everywhere else.
    #[error("path not found in context: {0}")]
    NotFound(String),

    /// JMESPath compilation or evaluation error
    #[error("jmespath error: {0}")]
    Jmespath(String),

    /// A `{{ ... }}` variable could not be resolved
    #[error("failed to substitute variables: {0}")]
    Substitution(String),

    /// A condition tree could not be parsed or evaluated
    #[error("invalid condition: {0}")]
    Condition(String),

    /// A context entry could not be resolved
    #[error("failed to load context: {0}")]
    ContextLoad(String),

    /// The admission deadline expired
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Check if this error is the distinguished not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
