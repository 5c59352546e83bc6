use thiserror::Error;

use crate::lifecycle::ModelState;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Model config error: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Adapter merge error: {0}")]
    Adapter(String),

    #[error("Model source error: {0}")]
    Source(String),

    #[error("Sequence too long: {got} tokens, max {max}")]
    SequenceTooLong { got: usize, max: usize },

    #[error("Cannot load model while lifecycle is {state}")]
    InvalidLoadState { state: ModelState },

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures of a single question-answering request.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid parameter '{field}': {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("Model is not loaded")]
    NotReady,

    #[error("Model is busy with another request")]
    Busy,

    #[error("Answer generation failed: {0}")]
    Failed(String),
}

impl From<CoreError> for GenerationError {
    fn from(e: CoreError) -> Self {
        GenerationError::Failed(e.to_string())
    }
}
