//! Per-request access checks.
//!
//! The guard turns an `Authorization` header into a [`Principal`]:
//! - [`AccessGuard::require_user`]: any valid access token
//! - [`AccessGuard::require_active_user`]: plus an active account
//! - [`AccessGuard::require_role`]: plus at least one allowed role
//! - [`AccessGuard::optional_user`]: a principal if one can be had, else none
//!
//! The web layer wraps these in extractors; the logic lives here so it can
//! be exercised without HTTP.

use tracing::debug;

use crate::error::AuthError;
use crate::principal::Principal;
use crate::role::Role;
use crate::token::{TokenService, TokenType};

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// Returns `InvalidToken` if the header is absent, uses another scheme, or
/// carries an empty token.
pub fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    let value = authorization.ok_or_else(|| AuthError::InvalidToken {
        reason: "authentication required".to_string(),
    })?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| AuthError::InvalidToken {
            reason: "malformed authorization header".to_string(),
        })?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidToken {
            reason: format!("unsupported authorization scheme '{scheme}'"),
        });
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken {
            reason: "empty bearer token".to_string(),
        });
    }
    Ok(token)
}

/// Fails with `Forbidden` unless the principal's account is active.
///
/// # Errors
///
/// Returns `Forbidden` for inactive or suspended accounts.
pub fn ensure_active(principal: &Principal) -> Result<(), AuthError> {
    if principal.is_active() {
        return Ok(());
    }
    debug!(email = %principal.email(), status = ?principal.status(), "inactive principal");
    Err(AuthError::Forbidden {
        reason: "User account is not active".to_string(),
    })
}

/// Fails with `Forbidden` unless the principal holds one of `allowed`.
///
/// # Errors
///
/// Returns `Forbidden` if no role matches.
pub fn ensure_role(principal: &Principal, allowed: &[Role]) -> Result<(), AuthError> {
    if principal.roles().intersects(allowed) {
        return Ok(());
    }
    debug!(email = %principal.email(), ?allowed, "principal lacks required role");
    Err(AuthError::Forbidden {
        reason: "Insufficient permissions".to_string(),
    })
}

/// Verifies bearer credentials and enforces status and role requirements.
#[derive(Clone)]
pub struct AccessGuard {
    tokens: TokenService,
}

impl AccessGuard {
    /// Creates a guard that verifies tokens with `tokens`.
    #[must_use]
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    /// Returns the principal for a valid access token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the header is missing or the token does not
    /// verify as an access token.
    pub fn require_user(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = bearer_token(authorization)?;
        let claims = self.tokens.verify(token, TokenType::Access)?;
        Ok(claims.principal())
    }

    /// Like [`AccessGuard::require_user`], and the account must be active.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` as for `require_user`, or `Forbidden` if the
    /// account is not active.
    pub fn require_active_user(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let principal = self.require_user(authorization)?;
        ensure_active(&principal)?;
        Ok(principal)
    }

    /// Like [`AccessGuard::require_active_user`], and the principal must hold
    /// at least one role in `allowed`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` or `Forbidden` as for `require_active_user`,
    /// or `Forbidden` if no role matches.
    pub fn require_role(
        &self,
        authorization: Option<&str>,
        allowed: &[Role],
    ) -> Result<Principal, AuthError> {
        let principal = self.require_active_user(authorization)?;
        ensure_role(&principal, allowed)?;
        Ok(principal)
    }

    /// Returns the principal if the header carries a valid access token.
    #[must_use]
    pub fn optional_user(&self, authorization: Option<&str>) -> Option<Principal> {
        self.require_user(authorization).ok()
    }
}
