//! Authentication routes for login, callback, tokens, and the current user.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration as ChronoDuration;
use portcullis_access::{
    AuthError, NewPrincipal, Principal, PrincipalUpdate, ProviderCapability, TokenPair,
};
use portcullis_session::{SessionId, SessionRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::Duration as TimeDuration;
use tracing::{debug, error, info};

use super::{
    AppState,
    callback::{CallbackHandler, CallbackParams},
    middleware::{OptionalUser, RequireActiveUser, RequireAdmin, RequireUser},
};
use crate::error::ApiError;

/// Login session cookie name.
pub const SESSION_COOKIE: &str = "session_id";

/// Access token cookie name.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Refresh token cookie name.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// How long a started login may wait for its callback, in seconds.
pub const LOGIN_SESSION_TTL_SECONDS: i64 = 600;

/// Service name reported by the health check.
const SERVICE_NAME: &str = "authentication";

/// Routes to be nested under `/auth`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/callback", get(callback))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me).put(update_me))
        .route("/users", get(list_users).post(create_user))
        .route("/health", get(health))
}

/// Returns true if cookies for this request must be marked Secure.
fn is_secure(state: &AppState, headers: &HeaderMap) -> bool {
    state.https_only
        || headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn http_only_cookie(
    name: &'static str,
    value: String,
    max_age: TimeDuration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}

/// Adds the access and refresh token cookies, each living as long as its token.
fn with_token_cookies(
    jar: CookieJar,
    state: &AppState,
    tokens: &TokenPair,
    secure: bool,
) -> CookieJar {
    let access_max_age = TimeDuration::seconds(state.tokens.access_ttl().num_seconds());
    let refresh_max_age = TimeDuration::seconds(state.tokens.refresh_ttl().num_seconds());

    jar.add(http_only_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        access_max_age,
        secure,
    ))
    .add(http_only_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        refresh_max_age,
        secure,
    ))
}

/// Optional body of a login request.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    /// Where to send the browser after a successful login.
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// Login response: the provider URL to visit and the CSRF state it carries.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub auth_url: String,
    pub state: String,
}

impl LoginRequest {
    /// Parses a login body. An empty or blank body is an empty request.
    fn from_body(body: &[u8]) -> Result<Self, AuthError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| AuthError::InvalidRequest {
            reason: format!("Invalid login request: {e}"),
        })
    }
}

/// Starts a login: stores a session record and returns the provider URL.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    OptionalUser(current): OptionalUser,
    body: Bytes,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let request = state.provider.authorization_url(None)?;
    let redirect_url = LoginRequest::from_body(&body)?.redirect_url;

    let session_id = SessionId::generate();
    let ttl = ChronoDuration::seconds(LOGIN_SESSION_TTL_SECONDS);
    let record = SessionRecord::new(request.state.clone(), redirect_url, ttl);
    state.sessions.set(&session_id, &record, ttl).await;

    if let Some(principal) = current {
        debug!(email = %principal.email(), "login started by an authenticated principal");
    }
    info!(%session_id, "login initiated");

    let cookie = http_only_cookie(
        SESSION_COOKIE,
        session_id.as_str().to_string(),
        TimeDuration::seconds(LOGIN_SESSION_TTL_SECONDS),
        is_secure(&state, &headers),
    );

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            auth_url: request.url,
            state: request.state,
        }),
    ))
}

/// Completes a login from the provider redirect.
///
/// Success is a 302 to the stored target with token cookies. Failure is a
/// JSON error body, not a redirect.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let provider = state.provider.provider()?;
    let session_id = jar
        .get(SESSION_COOKIE)
        .map(|cookie| SessionId::from(cookie.value()));

    let outcome =
        CallbackHandler::new(state.sessions.as_ref(), provider.as_ref(), &state.tokens)
            .run(params, session_id)
            .await?;

    let secure = is_secure(&state, &headers);
    let jar = with_token_cookies(jar, &state, &outcome.tokens, secure)
        .add(removal_cookie(SESSION_COOKIE));

    Ok((StatusCode::FOUND, jar, [(LOCATION, outcome.redirect_to)]).into_response())
}

/// Exchanges the refresh token cookie for a new token pair.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<TokenPair>), ApiError> {
    let refresh_token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| ApiError::unauthorized("Refresh token not found"))?;

    let tokens = state.tokens.refresh(&refresh_token)?;

    let secure = is_secure(&state, &headers);
    let jar = with_token_cookies(jar, &state, &tokens, secure);
    Ok((jar, Json(tokens)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Clears the authentication cookies.
pub async fn logout(
    RequireUser(principal): RequireUser,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    info!(email = %principal.email(), "user logged out");

    let jar = jar
        .add(removal_cookie(ACCESS_TOKEN_COOKIE))
        .add(removal_cookie(REFRESH_TOKEN_COOKIE))
        .add(removal_cookie(SESSION_COOKIE));
    (
        jar,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

/// Returns the current principal.
pub async fn me(RequireActiveUser(principal): RequireActiveUser) -> Json<Principal> {
    Json(principal)
}

/// Applies a partial update to the current principal and returns it.
///
/// Nothing is persisted; the next request sees the token's claims again.
pub async fn update_me(
    RequireActiveUser(principal): RequireActiveUser,
    body: Result<Json<PrincipalUpdate>, JsonRejection>,
) -> Result<Json<Principal>, ApiError> {
    let Json(update) = body?;
    info!(email = %principal.email(), "user updated profile");
    Ok(Json(principal.updated(update)))
}

/// Lists users. There is no user store, so the list is empty.
pub async fn list_users(admin: RequireAdmin) -> Json<Vec<Principal>> {
    debug!(admin = %admin.principal.email(), "listing users");
    Json(Vec::new())
}

/// Validates and echoes a new principal.
pub async fn create_user(
    admin: RequireAdmin,
    body: Result<Json<NewPrincipal>, JsonRejection>,
) -> Result<Json<Principal>, ApiError> {
    let Json(request) = body?;
    let principal = request.into_principal()?;
    info!(
        admin = %admin.principal.email(),
        email = %principal.email(),
        "admin created user"
    );
    Ok(Json(principal))
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msal_configured: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    fn healthy(configured: bool, message: Option<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            msal_configured: Some(configured),
            message,
            error: None,
        }
    }

    fn unhealthy() -> Self {
        Self {
            status: "unhealthy".to_string(),
            service: SERVICE_NAME.to_string(),
            msal_configured: None,
            message: None,
            error: Some("An internal error occurred.".to_string()),
        }
    }
}

/// Reports whether login is configured and working, without network calls.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    if let ProviderCapability::Unconfigured { .. } = &state.provider {
        return Json(HealthResponse::healthy(
            false,
            Some("Identity provider is not configured".to_string()),
        ));
    }

    match state.provider.authorization_url(Some("health-check".to_string())) {
        Ok(request) => Json(HealthResponse::healthy(!request.url.is_empty(), None)),
        Err(e) => {
            error!(error = %e, "authentication health check failed");
            Json(HealthResponse::unhealthy())
        }
    }
}
