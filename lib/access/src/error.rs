//! Error types for the access crate.
//!
//! `AuthError` is the single taxonomy for login, token, and access-check
//! failures. Transport status codes are assigned by the server, never here.

use std::fmt;

/// Errors from authentication and authorization operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The identity provider (or signing) was never configured.
    Configuration { reason: String },
    /// The request is missing required parameters.
    InvalidRequest { reason: String },
    /// No login session accompanies the callback.
    InvalidSession,
    /// The callback state does not match a live login session.
    InvalidState,
    /// The provider's claims carry no email address.
    MissingIdentity,
    /// The identity provider rejected the login.
    ///
    /// The description originates from the provider and is safe to show.
    /// It is absent when the provider could not be asked at all.
    UpstreamAuth { description: Option<String> },
    /// A bearer credential failed verification.
    InvalidToken { reason: String },
    /// The principal is authenticated but not allowed.
    Forbidden { reason: String },
    /// Anything else. The details are for logs only.
    Internal { details: String },
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => {
                write!(f, "authentication is not configured: {reason}")
            }
            Self::InvalidRequest { reason } => {
                write!(f, "invalid request: {reason}")
            }
            Self::InvalidSession => {
                write!(f, "invalid session")
            }
            Self::InvalidState => {
                write!(f, "invalid state parameter")
            }
            Self::MissingIdentity => {
                write!(f, "could not extract email from provider claims")
            }
            Self::UpstreamAuth { description } => match description {
                Some(description) => write!(f, "authentication failed: {description}"),
                None => write!(f, "authentication failed"),
            },
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::Forbidden { reason } => {
                write!(f, "forbidden: {reason}")
            }
            Self::Internal { details } => {
                write!(f, "internal error: {details}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl AuthError {
    /// Returns the message that may be shown to the caller.
    ///
    /// Internal details and token verification reasons are withheld.
    #[must_use]
    pub fn public_detail(&self) -> String {
        match self {
            Self::Configuration { .. } => "Authentication is not configured".to_string(),
            Self::InvalidRequest { reason } => reason.clone(),
            Self::InvalidSession => "Invalid session".to_string(),
            Self::InvalidState => "Invalid state parameter".to_string(),
            Self::MissingIdentity => "Could not extract email from token".to_string(),
            Self::UpstreamAuth { description } => match description {
                Some(description) => format!("Authentication failed: {description}"),
                None => "Authentication failed".to_string(),
            },
            Self::InvalidToken { .. } => "Invalid token".to_string(),
            Self::Forbidden { reason } => reason.clone(),
            Self::Internal { .. } => "Internal server error".to_string(),
        }
    }
}
