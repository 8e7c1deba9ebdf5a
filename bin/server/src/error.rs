//! Error types for the HTTP surface.
//!
//! `AuthError` kinds are mapped to status codes here and nowhere else.
//! Every error response is a JSON `{status, detail}` body; the detail is
//! always the public text, and internal failures are logged instead.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use portcullis_access::AuthError;
use serde::Serialize;
use std::fmt;
use tracing::error;

/// An error ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    challenge: bool,
}

impl ApiError {
    /// A 401 with a bearer challenge and a custom detail.
    #[must_use]
    pub fn unauthorized(detail: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail: detail.to_string(),
            challenge: true,
        }
    }

    /// Returns the HTTP status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the public detail text.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Returns the status code for an error kind.
#[must_use]
pub fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::Configuration { .. } => StatusCode::NOT_IMPLEMENTED,
        AuthError::InvalidRequest { .. }
        | AuthError::InvalidSession
        | AuthError::InvalidState
        | AuthError::MissingIdentity
        | AuthError::UpstreamAuth { .. } => StatusCode::BAD_REQUEST,
        AuthError::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
        AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
        AuthError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self {
            status,
            detail: err.public_detail(),
            challenge: matches!(err, AuthError::InvalidToken { .. }),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::from(AuthError::InvalidRequest {
            reason: rejection.body_text(),
        })
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    detail: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            status: self.status.as_u16(),
            detail: &self.detail,
        });
        let mut response = (self.status, body).into_response();
        if self.challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Errors that stop the server from starting or keep it from serving.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded or is unusable.
    Configuration { details: String },
    /// The configured session store could not be reached.
    SessionStore { details: String },
    /// The listen address could not be bound.
    Bind { address: String, details: String },
    /// The server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => {
                write!(f, "configuration error: {details}")
            }
            Self::SessionStore { details } => {
                write!(f, "session store unavailable: {details}")
            }
            Self::Bind { address, details } => {
                write!(f, "failed to bind to '{address}': {details}")
            }
            Self::Serve { details } => {
                write!(f, "server error: {details}")
            }
        }
    }
}

impl std::error::Error for StartupError {}
