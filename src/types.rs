//! Shared error type for the EmoGo backend
//!
//! Every fallible operation in the library returns [`Result`]. Errors are not
//! recovered where they happen; they travel up to the HTTP boundary where
//! [`EmogoError::status_code`] picks the outward status.

use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmogoError {
    /// Unknown blob identifier. Malformed identifiers land here too.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Backing medium unreachable, or a write failed partway.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Outward consumer went away mid-transfer.
    #[error("Stream aborted after {sent_bytes} bytes")]
    StreamAborted { sent_bytes: u64 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body did not match the expected record shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Archive error: {0}")]
    Archive(String),


    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EmogoError {
    /// HTTP status this error maps to at the transport boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            EmogoError::NotFound(_) => StatusCode::NOT_FOUND,
            EmogoError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EmogoError::BadRequest(_) => StatusCode::BAD_REQUEST,
            EmogoError::InvalidPayload(_) | EmogoError::Json(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            // Never sent to a client; the connection is already gone.
            EmogoError::StreamAborted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EmogoError::Database(_)
            | EmogoError::Archive(_)
            | EmogoError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EmogoError::NotFound(_))
    }
}

impl From<zip::result::ZipError> for EmogoError {
    fn from(err: zip::result::ZipError) -> Self {
        EmogoError::Archive(err.to_string())
    }
}

impl From<mongodb::error::Error> for EmogoError {
    fn from(err: mongodb::error::Error) -> Self {
        EmogoError::Database(err.to_string())
    }
}

pub type Result<T, E = EmogoError> = std::result::Result<T, E>;
