use context_retriever::RetrieverError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The request was superseded by a fetch for another section.
    #[error("graph context request aborted")]
    Aborted,

    #[error("symbol provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Host(#[from] RetrieverError),

    #[error("{0}")]
    Other(String),
}

impl GraphError {
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted | Self::Host(RetrieverError::Aborted))
    }
}

impl From<GraphError> for RetrieverError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Aborted => RetrieverError::Aborted,
            GraphError::Host(inner) => inner,
            other => RetrieverError::Other(other.to_string()),
        }
    }
}
