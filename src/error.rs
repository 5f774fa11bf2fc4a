//! Error types for BookMagic

use thiserror::Error;

use crate::recognition::RecognitionError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Book not found: {0}")]
    BookNotFound(i64),

    #[error("Failed to load book: {0}")]
    LoadFailed(String),

    #[error("Page {page} is outside 1..={total}")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Save failed: {0}")]
    Save(String),

    #[error("Text recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to pick a message and a recovery action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    File,
    Parse,
    NotFound,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Message suitable for the reader's error banner
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Connection to the text recognition engine failed.",
            ErrorKind::File => {
                "Failed to read or write the file. Make sure it exists and is accessible."
            }
            ErrorKind::Parse => "Failed to parse data. The file might be corrupted.",
            ErrorKind::NotFound => "The requested book was not found.",
            ErrorKind::Timeout => "The operation timed out. Please try again.",
            ErrorKind::Unknown => "An unexpected error occurred. Please try again.",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BookNotFound(_) => ErrorKind::NotFound,
            AppError::Io(_) => ErrorKind::File,
            AppError::Recognition(e) => match e {
                RecognitionError::StartupTimeout(_) => ErrorKind::Timeout,
                RecognitionError::InvalidResponse(_) => ErrorKind::Parse,
                RecognitionError::Io(_) => ErrorKind::File,
                _ => ErrorKind::Network,
            },
            AppError::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            AppError::Database(sqlx::Error::PoolTimedOut) => ErrorKind::Timeout,
            AppError::Database(sqlx::Error::Io(_)) => ErrorKind::File,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether the UI should offer "retry" rather than "back to library"
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::NotFound
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}
