use thiserror::Error;

/// Errors produced while parsing or framing IRC lines.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("empty message")]
    EmptyMessage,

    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("line exceeds maximum length of {max} bytes")]
    LineTooLong { max: usize },

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
