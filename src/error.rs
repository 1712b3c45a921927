use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

/// Coarse classification of a failure, used by callers that translate errors
/// into a transport status (HTTP, CLI exit code, ...).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    NotFound,
    AlreadyExists,
    Internal,
}

#[derive(Error, Debug)]
pub enum FileTreeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Error: {0}")]
    Error(String),
}

impl FileTreeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileTreeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            FileTreeError::InvalidState(_) => ErrorKind::InvalidState,
            FileTreeError::NotFound(_) => ErrorKind::NotFound,
            FileTreeError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            FileTreeError::Internal(_)
            | FileTreeError::IoError(_)
            | FileTreeError::DatabaseError(_)
            | FileTreeError::PoolError(_)
            | FileTreeError::JsonError(_)
            | FileTreeError::Error(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn node_not_found(inode: &str) -> Self {
        FileTreeError::NotFound(format!("node '{}' does not exist", inode))
    }
}
