//! Common error types for seriallink.
//!
//! Every failure of a link operation is reported through [`Error`]. A read
//! that sees no data within its window is not an error; see
//! [`ReadOutcome::Timeout`](crate::transport::ReadOutcome::Timeout).

use std::io;
use thiserror::Error;

/// Main error type for link operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The port could not be opened (busy, not found, permission denied,
    /// unusable settings).
    #[error("Failed to open serial port: {cause}")]
    Open {
        #[source]
        cause: io::Error,
    },

    /// A read or write was attempted while the link is not connected.
    #[error("Serial link is not connected")]
    NotConnected,

    /// I/O failure while reading from an established link
    #[error("Read error: {cause}")]
    Read {
        #[source]
        cause: io::Error,
    },

    /// I/O failure while writing to an established link
    #[error("Write error: {cause}")]
    Write {
        #[source]
        cause: io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn open(cause: io::Error) -> Self {
        Error::Open { cause }
    }

    pub(crate) fn read(cause: io::Error) -> Self {
        Error::Read { cause }
    }

    pub(crate) fn write(cause: io::Error) -> Self {
        Error::Write { cause }
    }

    /// The underlying I/O error, if this error carries one.
    pub fn io_cause(&self) -> Option<&io::Error> {
        match self {
            Error::Open { cause } | Error::Read { cause } | Error::Write { cause } => Some(cause),
            Error::NotConnected | Error::Config(_) => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
