use crate::types::DbId;

/// Boxed error used to carry transport failures from concrete adapters
/// without tying this crate to a database driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error("Fan-out transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("Fan-out codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Invalid fan-out option: {0}")]
    InvalidOption(String),

    #[error("Attachment {0} not found")]
    MissingAttachment(DbId),

    #[error("Fan-out adapter is closed")]
    Closed,
}

impl FanoutError {
    /// Wrap any driver error as a transport failure.
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(err))
    }
}
