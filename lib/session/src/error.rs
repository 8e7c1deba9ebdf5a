//! Error types for session storage backends.
//!
//! These never cross the [`SessionStore`](crate::SessionStore) boundary:
//! backends report them through `tracing` and degrade to "session absent".

use std::fmt;

/// Errors from a session storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    /// Could not connect to the backing store.
    Connection { details: String },
    /// A command against the backing store failed.
    Command { operation: &'static str, details: String },
    /// A record could not be encoded or decoded.
    Serialization { details: String },
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { details } => {
                write!(f, "failed to connect to session store: {details}")
            }
            Self::Command { operation, details } => {
                write!(f, "session store {operation} failed: {details}")
            }
            Self::Serialization { details } => {
                write!(f, "invalid session record: {details}")
            }
        }
    }
}

impl std::error::Error for SessionStoreError {}
