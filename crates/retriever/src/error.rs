use context_protocol::Uri;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrieverError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrieverError {
    /// Cancelled by a newer retrieval or by the caller. Expected, never worth more than a debug log.
    #[error("retrieval aborted")]
    Aborted,

    #[error("document not available: {0}")]
    DocumentUnavailable(Uri),

    #[error("graph engine error: {0}")]
    Engine(String),

    #[error("graph engine is not running")]
    EngineClosed,

    #[error("{0}")]
    Other(String),
}

impl RetrieverError {
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
