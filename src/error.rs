use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Unsupported command: {0}")]
    Unsupported(String),

    #[error("Failed to decode image: {0}")]
    Decoding(String),

    #[error("Failed to encode image: {0}")]
    Encoding(String),
}

impl ProcessingError {
    /// True when the error is a cooperative abort rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessingError::Cancelled)
    }

    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            ProcessingError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ProcessingError::InvalidState(_) => "INVALID_STATE",
            ProcessingError::Cancelled => "CANCELLED",
            ProcessingError::Unsupported(_) => "UNSUPPORTED",
            ProcessingError::Decoding(_) => "DECODING_ERROR",
            ProcessingError::Encoding(_) => "ENCODING_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
