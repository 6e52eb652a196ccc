use thiserror::Error;

/// Failures the reconciliation loop and the command router can recover from.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("{operation} on {endpoint} failed: {message}")]
    Transport {
        endpoint: String,
        operation: &'static str,
        message: String,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("preference store error: {0}")]
    Persistence(String),
    #[error("chat {0} is not authorized")]
    Unauthorized(i64),
}

impl NotifierError {
    pub fn transport(
        endpoint: &str,
        operation: &'static str,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            operation,
            message: message.to_string(),
        }
    }
}

impl From<rusqlite::Error> for NotifierError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type NotifierResult<T> = Result<T, NotifierError>;
