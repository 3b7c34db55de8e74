use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not initialized: run 'prdloop init'")]
    NotInitialized,

    #[error("backlog not found: {0}")]
    BacklogNotFound(String),

    #[error("story not found: {0}")]
    StoryNotFound(String),

    #[error("phase not found: {0}")]
    PhaseNotFound(i64),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("advisor error: {0}")]
    Advisor(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
