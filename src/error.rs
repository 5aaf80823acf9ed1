//! Error types for the Roost core

use thiserror::Error;

use crate::parser::ParserError;

/// Convenience result alias used throughout the core
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the core library
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol/network failure reported by a parser. These are forwarded
    /// to observers as events and are never fatal to the board itself.
    #[error(transparent)]
    Parser(#[from] ParserError),

    /// Persistence failure. Board row inserts/updates raise this; cascade
    /// steps (per-forum, per-var) log and continue instead.
    #[error("database error: {message}")]
    Database {
        /// Driver error text, including the failing statement where known
        message: String,
    },

    /// A corrupted invariant: re-parenting an owned child, threads attached
    /// to a category node, a missing parent during tree insert. Not
    /// expected in normal operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// No parser factory is registered for the requested protocol name
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }
}

impl Error {
    /// Build a database error from driver text
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Build an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}
