/// Represents the different types of errors that can occur in the intent classifier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifierError {
    /// The tokenizer has not finished loading
    #[error("Tokenizer not ready")]
    TokenizerNotReady,
    /// Error occurred while loading or using the tokenizer
    #[error("Tokenizer error: {0}")]
    TokenizerError(String),
    /// Error occurred while building the vocabulary, encoder or model
    #[error("Build error: {0}")]
    BuildError(String),
    /// Error occurred while fitting model parameters
    #[error("Training error: {0}")]
    TrainingError(String),
    /// Error occurred while making predictions
    #[error("Prediction error: {0}")]
    PredictionError(String),
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// The build was abandoned by its caller before it finished
    #[error("Build cancelled")]
    Cancelled,
}
