//! Error types and handling for the sanitization gate
//! Author: kartik4091

use std::{error::Error as StdError, fmt, io, result::Result as StdResult};

use thiserror::Error;

/// Custom result type for gate operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for gate operations.
///
/// Every variant is terminal for the request it belongs to. Callers that
/// face the outside world should go through [`Error::kind`] and
/// [`ErrorKind::public_message`] instead of printing the error itself.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Authentication failed")]
    AuthenticationFailure,

    #[error("Empty input")]
    EmptyInput,

    #[error("Input of {size} bytes exceeds the {limit} byte ceiling")]
    OversizedInput { size: u64, limit: u64 },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Document is encrypted or password protected")]
    PasswordProtected,

    #[error("Malformed structure: {0}")]
    MalformedStructure(#[from] StructureError),

    #[error("Serialization failed: {0}")]
    SerializationFailure(String),

    #[error("No sanitization engine available: {0}")]
    EngineUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// Helper for creating an `Internal` error with a boxed source
    pub fn internal<E: StdError + Send + Sync + 'static>(e: E) -> Self {
        Error::Internal(Box::new(e))
    }

    /// Map onto the caller-visible taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            Error::EmptyInput => ErrorKind::EmptyInput,
            Error::OversizedInput { .. } => ErrorKind::OversizedInput,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::PasswordProtected => ErrorKind::PasswordProtected,
            Error::MalformedStructure(_) => ErrorKind::MalformedStructure,
            Error::SerializationFailure(_) | Error::Io(_) | Error::Internal(_) => {
                ErrorKind::SerializationFailure
            }
            Error::EngineUnavailable(_) | Error::Config(_) => ErrorKind::EngineUnavailable,
        }
    }
}

/// Structural problems found while reading a document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StructureError {
    #[error("Invalid PDF header: {0}")]
    InvalidHeader(String),

    #[error("Invalid xref table: {0}")]
    InvalidXref(String),

    #[error("Invalid trailer: {0}")]
    InvalidTrailer(String),

    #[error("Missing required object: {0}")]
    MissingObject(String),

    #[error("Corrupted structure at byte {offset}: {reason}")]
    Corrupted { offset: usize, reason: String },

    #[error("Nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("Stream decode failed: {0}")]
    Decode(String),
}

impl StructureError {
    pub(crate) fn corrupted(offset: usize, reason: impl Into<String>) -> Self {
        StructureError::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}

/// The caller-visible error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationFailure,
    EmptyInput,
    OversizedInput,
    UnsupportedFormat,
    PasswordProtected,
    MalformedStructure,
    SerializationFailure,
    EngineUnavailable,
}

impl ErrorKind {
    /// HTTP status the gateway answers with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::AuthenticationFailure => 401,
            ErrorKind::EmptyInput => 400,
            ErrorKind::OversizedInput => 413,
            ErrorKind::UnsupportedFormat => 415,
            ErrorKind::PasswordProtected => 400,
            ErrorKind::MalformedStructure | ErrorKind::SerializationFailure => 400,
            ErrorKind::EngineUnavailable => 500,
        }
    }

    /// Generic text safe to hand back to an untrusted caller.
    pub fn public_message(self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailure => "Unauthorized",
            ErrorKind::EmptyInput => "Empty file",
            ErrorKind::OversizedInput => "File too large",
            ErrorKind::UnsupportedFormat => "Only PDF files are allowed",
            ErrorKind::PasswordProtected => "Password-protected/encrypted PDFs are not allowed",
            ErrorKind::MalformedStructure | ErrorKind::SerializationFailure => "Could not sanitize",
            ErrorKind::EngineUnavailable => "Sanitization engine unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AuthenticationFailure => "AuthenticationFailure",
            ErrorKind::EmptyInput => "EmptyInput",
            ErrorKind::OversizedInput => "OversizedInput",
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::PasswordProtected => "PasswordProtected",
            ErrorKind::MalformedStructure => "MalformedStructure",
            ErrorKind::SerializationFailure => "SerializationFailure",
            ErrorKind::EngineUnavailable => "EngineUnavailable",
        };
        write!(f, "{}", name)
    }
}
