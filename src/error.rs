use anyhow::Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// First structural error reported while parsing an import.
    #[error("{0}")]
    Parse(String),
    #[error("The project data store could not be opened. Close other sessions using it and try again. ({0})")]
    StorageUnavailable(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(#[from] Error),
}

impl AppError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> Self {
        err.to_string()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
