//! Authentication extractors for Axum.
//!
//! Each extractor reads the `Authorization: Bearer` header and delegates to
//! the shared [`AccessGuard`](portcullis_access::AccessGuard). Failures
//! reject the request with the mapped [`ApiError`].

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use portcullis_access::{Principal, Role};
use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::Arc;

use super::AppState;
use crate::error::ApiError;

fn authorization_header(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Extractor for requiring a valid access token.
pub struct RequireUser(pub Principal);

impl<S> FromRequestParts<S> for RequireUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let principal = app_state.guard.require_user(authorization_header(parts))?;
        Ok(RequireUser(principal))
    }
}

/// Extractor for requiring a valid access token of an active account.
pub struct RequireActiveUser(pub Principal);

impl<S> FromRequestParts<S> for RequireActiveUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let principal = app_state
            .guard
            .require_active_user(authorization_header(parts))?;
        Ok(RequireActiveUser(principal))
    }
}

/// A set of roles a route accepts.
pub trait RoleRequirement {
    /// The principal must hold at least one of these.
    const ALLOWED: &'static [Role];
}

/// Accepts admins only.
pub struct AdminOnly;

impl RoleRequirement for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Extractor for requiring an active principal holding one of `R::ALLOWED`.
pub struct RequireRole<R> {
    pub principal: Principal,
    requirement: PhantomData<fn() -> R>,
}

/// Extractor for requiring an active admin.
pub type RequireAdmin = RequireRole<AdminOnly>;

impl<S, R> FromRequestParts<S> for RequireRole<R>
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
    R: RoleRequirement,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let principal = app_state
            .guard
            .require_role(authorization_header(parts), R::ALLOWED)?;
        Ok(RequireRole {
            principal,
            requirement: PhantomData,
        })
    }
}

/// Extractor for optionally getting the authenticated principal.
///
/// Returns None if the header is absent or the token does not verify.
pub struct OptionalUser(pub Option<Principal>);

impl<S> FromRequestParts<S> for OptionalUser
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        Ok(OptionalUser(
            app_state.guard.optional_user(authorization_header(parts)),
        ))
    }
}
