//! Shared error definitions for observability primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the observability toolkit.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided trace or span identifier could not be parsed.
    #[error("invalid identifier: {source}")]
    InvalidId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// An unknown severity string was supplied.
    #[error("unknown severity `{0}`")]
    UnknownSeverity(String),
}
