//! Error types for the classification pipeline

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fatal pipeline failures. Any of these aborts the run.
///
/// Per-row persistence failures are not errors; they are collected as
/// [`PersistenceWarning`](super::persist::PersistenceWarning)s instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Missing text column, empty dataset, or nothing left after cleaning
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// Tokenizer or classification head could not be loaded
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// A batch forward pass failed
    #[error("inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    /// Create a new input validation error
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InputValidation(msg.into())
    }

    /// Create a new model load error
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }
}
