use std::io;

use thiserror::Error;

/// Errors reported by a password store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{0}' does not exist in the password store")]
    NotFound(String),

    #[error("permission denied for '{0}'")]
    PermissionDenied(String),

    #[error("'{0}' already exists in the password store")]
    AlreadyExists(String),

    #[error("invalid store path '{0}'")]
    InvalidPath(String),

    #[error("password store could not be opened: {0}")]
    Init(String),

    #[error("gpg failed: {0}")]
    Crypto(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Classify an I/O failure that happened while touching `path`.
    pub fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied(path.to_string()),
            io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(path.to_string()),
            _ => StoreError::Io(err),
        }
    }

    /// Not-found and permission-denied are the recoverable access failures.
    pub fn is_access_error(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::PermissionDenied(_))
    }
}
