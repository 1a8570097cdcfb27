use thiserror::Error;

pub type Result<T> = std::result::Result<T, MixerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MixerError {
    #[error("context request aborted")]
    Aborted,

    #[error("invalid mixer configuration: {0}")]
    InvalidConfig(String),
}

impl MixerError {
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
