//! Error taxonomy for library operations.

use serde::Serialize;
use thiserror::Error;

use crate::codec::PngError;

/// Errors that can occur in library operations
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Malformed PNG container or unparsable card JSON
    #[error("Format error: {0}")]
    Format(String),

    /// No card or image resolves for the given id
    #[error("Not found: {0}")]
    NotFound(String),

    /// An id resolves outside the library root or contains traversal
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A card payload is not object-shaped
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Request cannot be satisfied as given (e.g. PNG save without avatar)
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error kind for transport layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    NotFound,
    InvalidPath,
    InvalidPayload,
    Validation,
    Io,
}

impl LibraryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::Format(_) => ErrorKind::Format,
            LibraryError::NotFound(_) => ErrorKind::NotFound,
            LibraryError::InvalidPath(_) => ErrorKind::InvalidPath,
            LibraryError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            LibraryError::Validation(_) => ErrorKind::Validation,
            LibraryError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<PngError> for LibraryError {
    fn from(err: PngError) -> Self {
        match err {
            PngError::NoCardData => LibraryError::NotFound(err.to_string()),
            other => LibraryError::Format(other.to_string()),
        }
    }
}
