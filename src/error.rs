use thiserror::Error;

/// Failures scoped to a single pipeline request. None of these are fatal to
/// the process.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("insufficient data for {operation}: need at least {required} records, got {actual}")]
    InsufficientData {
        operation: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{0} model is not trained yet")]
    ModelNotReady(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl PipelineError {
    pub fn insufficient(operation: &'static str, required: usize, actual: usize) -> Self {
        PipelineError::InsufficientData {
            operation,
            required,
            actual,
        }
    }
}
