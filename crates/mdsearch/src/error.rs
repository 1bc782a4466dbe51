#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("another search is already in progress")]
    RejectedConcurrent,

    #[error("search backend refused to start: {0}")]
    BackendStartFailure(String),

    #[error("invalid filter: {0}")]
    InvalidFilterShape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SearchError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
