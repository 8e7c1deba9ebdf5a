//! Application router and cross-cutting layers.

use axum::{
    Router,
    http::{
        HeaderName, HeaderValue, Method,
        header::{
            AUTHORIZATION, CONTENT_SECURITY_POLICY, CONTENT_TYPE, REFERRER_POLICY,
            STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
    },
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::{AppState, routes};

const CONTENT_SECURITY_POLICY_VALUE: &str =
    "default-src 'self'; frame-ancestors 'none'; base-uri 'self'; form-action 'self'";

const STRICT_TRANSPORT_SECURITY_VALUE: &str = "max-age=31536000; includeSubDomains";

/// Builds the application router with all layers applied.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let https_only = state.https_only;

    let mut app = Router::new()
        .nest("/auth", routes::router())
        .with_state(state)
        .layer(static_header(X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(static_header(X_FRAME_OPTIONS, "DENY"))
        .layer(static_header(
            REFERRER_POLICY,
            "strict-origin-when-cross-origin",
        ))
        .layer(static_header(
            CONTENT_SECURITY_POLICY,
            CONTENT_SECURITY_POLICY_VALUE,
        ));

    if https_only {
        app = app.layer(static_header(
            STRICT_TRANSPORT_SECURITY,
            STRICT_TRANSPORT_SECURITY_VALUE,
        ));
    }

    app.layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn static_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

/// Credentialed CORS for the configured origins. Unparseable origins are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use portcullis_access::{
        IdentityClaims, IdentityProvider, Principal, ProviderCapability, ProviderError,
        RoleSet, TokenConfig, TokenService, TokenType,
    };
    use portcullis_session::{MemorySessionStore, SessionId, SessionStore};
    use serde_json::Value;
    use tower::ServiceExt;

    struct FakeProvider;

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
            Ok(format!(
                "https://idp.test/authorize?client_id=c\
                 &redirect_uri=http%3A%2F%2Flocalhost%3A8088%2Fauth%2Fcallback&state={state}"
            ))
        }

        async fn exchange_code(&self, code: &str) -> Result<IdentityClaims, ProviderError> {
            if code != "abc" {
                return Err(ProviderError::Rejected {
                    error: "invalid_grant".to_string(),
                    description: Some("Bad code".to_string()),
                });
            }
            Ok(IdentityClaims {
                preferred_username: Some("a@b.com".to_string()),
                ..IdentityClaims::default()
            })
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl IdentityProvider for BrokenProvider {
        fn authorization_url(&self, _state: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Configuration {
                details: "invalid redirect URI".to_string(),
            })
        }

        async fn exchange_code(&self, _code: &str) -> Result<IdentityClaims, ProviderError> {
            Err(ProviderError::Transport {
                details: "unreachable".to_string(),
            })
        }
    }

    struct TestApp {
        router: Router,
        sessions: Arc<MemorySessionStore>,
        tokens: TokenService,
    }

    fn test_app_with(provider: ProviderCapability, https_only: bool) -> TestApp {
        let sessions = Arc::new(MemorySessionStore::new());
        let tokens =
            TokenService::new(&TokenConfig::new("router-test-secret".to_string())).expect("tokens");
        let state = Arc::new(AppState::new(
            sessions.clone(),
            provider,
            tokens.clone(),
            https_only,
        ));
        TestApp {
            router: router(state, &["http://localhost:3000".to_string()]),
            sessions,
            tokens,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(ProviderCapability::Configured(Arc::new(FakeProvider)), false)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    fn cookie<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
        let prefix = format!("{name}=");
        cookies.iter().find(|c| c.starts_with(&prefix)).map(String::as_str)
    }

    fn cookie_value(set_cookie: &str) -> String {
        set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
            .expect("cookie value")
    }

    fn bearer(tokens: &TokenService, principal: &Principal) -> String {
        format!("Bearer {}", tokens.mint(principal).expect("mint").access_token)
    }

    async fn start_login(app: &TestApp) -> (String, String) {
        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        let session_id = cookie_value(cookie(&cookies, "session_id").expect("session cookie"));
        let body = json_body(response).await;
        let state = body["state"].as_str().expect("state").to_string();
        (session_id, state)
    }

    async fn call_callback(app: &TestApp, query: &str, session_id: Option<&str>) -> Response {
        let mut request = Request::builder().uri(format!("/auth/callback?{query}"));
        if let Some(session_id) = session_id {
            request = request.header(header::COOKIE, format!("session_id={session_id}"));
        }
        app.router
            .clone()
            .oneshot(request.body(Body::empty()).expect("request"))
            .await
            .expect("response")
    }

    #[tokio::test]
    async fn login_returns_url_state_and_session_cookie() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        let session_cookie = cookie(&cookies, "session_id").expect("session cookie");
        assert!(session_cookie.contains("Max-Age=600"));
        assert!(session_cookie.contains("HttpOnly"));
        assert!(session_cookie.contains("SameSite=Lax"));
        assert!(!session_cookie.contains("Secure"));

        let body = json_body(response).await;
        let state = body["state"].as_str().expect("state");
        let auth_url = body["auth_url"].as_str().expect("auth_url");
        assert!(state.len() >= 32);
        assert!(auth_url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8088%2Fauth%2Fcallback"));
        assert!(auth_url.contains(state));

        let stored = app
            .sessions
            .get(&SessionId::from(cookie_value(session_cookie)))
            .await
            .expect("session stored");
        assert!(stored.matches_state(state));
    }

    #[tokio::test]
    async fn login_stores_redirect_target() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"redirect_url": "/settings"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        let cookies = set_cookies(&response);
        let session_id = cookie_value(cookie(&cookies, "session_id").expect("session cookie"));
        let body = json_body(response).await;
        let state = body["state"].as_str().expect("state");

        let callback =

            call_callback(&app, &format!("code=abc&state={state}"), Some(&session_id)).await;
        assert_eq!(callback.status(), StatusCode::FOUND);
        assert_eq!(
            callback.headers().get(header::LOCATION).map(|v| v.as_bytes()),
            Some(&b"/settings"[..])
        );
    }

    #[tokio::test]
    async fn login_accepts_empty_json_body() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(cookie(&cookies, "session_id").is_some());
        let body = json_body(response).await;
        assert!(body["auth_url"].as_str().is_some());
    }

    #[tokio::test]
    async fn login_with_malformed_body_is_json_bad_request() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookies(&response).is_empty());
        let body = json_body(response).await;
        assert_eq!(body["status"], 400);
        assert!(
            body["detail"]
                .as_str()
                .expect("detail")
                .starts_with("Invalid login request")
        );
    }

    #[tokio::test]
    async fn login_cookie_is_secure_behind_https_proxy() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .header("x-forwarded-proto", "https")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let cookies = set_cookies(&response);
        assert!(cookie(&cookies, "session_id").expect("cookie").contains("Secure"));
    }

    #[tokio::test]
    async fn login_without_provider_is_not_implemented() {
        let app = test_app_with(
            ProviderCapability::Unconfigured {
                reason: "missing client_id".to_string(),
            },
            false,
        );

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/login")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], 501);
        assert_eq!(body["detail"], "Authentication is not configured");
    }

    #[tokio::test]
    async fn callback_redirects_sets_tokens_and_consumes_session() {
        let app = test_app();
        let (session_id, state) = start_login(&app).await;

        let response =

            call_callback(&app, &format!("code=abc&state={state}"), Some(&session_id)).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).map(|v| v.as_bytes()),
            Some(&b"/"[..])
        );

        let cookies = set_cookies(&response);
        let access = cookie(&cookies, "access_token").expect("access cookie");
        let refresh = cookie(&cookies, "refresh_token").expect("refresh cookie");
        assert!(access.contains("HttpOnly") && access.contains("SameSite=Lax"));
        assert!(access.contains("Max-Age=1800"));
        assert!(refresh.contains("Max-Age=604800"));

        let claims = app
            .tokens
            .verify(&cookie_value(access), TokenType::Access)
            .expect("access token verifies");
        assert_eq!(claims.sub, "a@b.com");

        assert!(app.sessions.get(&SessionId::from(session_id)).await.is_none());
    }

    #[tokio::test]
    async fn callback_replay_is_rejected() {
        let app = test_app();
        let (session_id, state) = start_login(&app).await;
        let query = format!("code=abc&state={state}");

        let first = call_callback(&app, &query, Some(&session_id)).await;
        assert_eq!(first.status(), StatusCode::FOUND);

        let second = call_callback(&app, &query, Some(&session_id)).await;
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        let body = json_body(second).await;
        assert_eq!(body["detail"], "Invalid state parameter");
    }

    #[tokio::test]
    async fn callback_with_forged_state_is_rejected() {
        let app = test_app();
        let (session_id, _state) = start_login(&app).await;

        let response = call_callback(&app, "code=abc&state=forged", Some(&session_id)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .is_some_and(|v| v.as_bytes().starts_with(b"application/json"))
        );
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Invalid state parameter");
        assert!(app.sessions.get(&SessionId::from(session_id)).await.is_some());
    }

    #[tokio::test]
    async fn callback_without_session_cookie_is_invalid_session() {
        let app = test_app();
        let (_session_id, state) = start_login(&app).await;

        let response = call_callback(&app, &format!("code=abc&state={state}"), None).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Invalid session");
    }

    #[tokio::test]
    async fn callback_passes_provider_error_through() {
        let app = test_app();

        let response = call_callback(
            &app,
            "error=access_denied&error_description=User%20cancelled%20login",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Authentication failed: User cancelled login");
    }

    #[tokio::test]
    async fn callback_with_rejected_code_reports_provider_description() {
        let app = test_app();
        let (session_id, state) = start_login(&app).await;

        let response =

            call_callback(&app, &format!("code=stale&state={state}"), Some(&session_id)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Authentication failed: Bad code");
    }

    #[tokio::test]
    async fn callback_missing_parameters_is_bad_request() {
        let app = test_app();
        let (session_id, _state) = start_login(&app).await;

        let response = call_callback(&app, "code=abc", Some(&session_id)).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Missing authorization code or state");
    }

    #[tokio::test]
    async fn refresh_issues_new_pair_from_cookie() {
        let app = test_app();
        let principal = Principal::from_email("r@b.com").with_roles(RoleSet::admin());
        let pair = app.tokens.mint(&principal).expect("mint");

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/refresh")
                    .header(header::COOKIE, format!("refresh_token={}", pair.refresh_token))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(cookie(&cookies, "access_token").is_some());
        assert!(cookie(&cookies, "refresh_token").is_some());

        let body = json_body(response).await;
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 1800);
        let claims = app
            .tokens
            .verify(body["access_token"].as_str().expect("token"), TokenType::Access)
            .expect("verifies");
        assert_eq!(claims.sub, "r@b.com");
        assert!(!claims.principal().roles().is_admin());
    }

    #[tokio::test]
    async fn refresh_without_cookie_is_unauthorized() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/refresh")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Refresh token not found");
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let app = test_app();
        let pair = app.tokens.mint(&Principal::from_email("a@b.com")).expect("mint");

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/refresh")
                    .header(header::COOKIE, format!("refresh_token={}", pair.access_token))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_works_without_provider() {
        let app = test_app_with(
            ProviderCapability::Unconfigured {
                reason: "missing tenant_id".to_string(),
            },
            false,
        );
        let pair = app.tokens.mint(&Principal::from_email("a@b.com")).expect("mint");

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/refresh")
                    .header(header::COOKIE, format!("refresh_token={}", pair.refresh_token))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn me_requires_bearer_token() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/me")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .map(|v| v.as_bytes()),
            Some(&b"Bearer"[..])
        );
        let body = json_body(response).await;
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn me_returns_principal_from_token() {
        let app = test_app();
        let principal = Principal::new("a@b.com".to_string(), "Alice".to_string());

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/me")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &principal))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["email"], "a@b.com");
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["roles"], serde_json::json!(["user"]));
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn update_me_applies_partial_update() {
        let app = test_app();
        let principal = Principal::new("a@b.com".to_string(), "Alice".to_string());

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/auth/me")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &principal))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name": "Alicia"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["name"], "Alicia");
        assert_eq!(body["email"], "a@b.com");
    }

    #[tokio::test]
    async fn update_me_with_malformed_json_is_json_bad_request() {
        let app = test_app();
        let principal = Principal::from_email("a@b.com");

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/auth/me")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &principal))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"name\": "))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
            Some(&b"application/json"[..])
        );
        let body = json_body(response).await;
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn admin_route_forbids_user_and_allows_admin() {
        let app = test_app();
        let user = Principal::from_email("u@b.com");
        let admin = Principal::from_email("root@b.com").with_roles(RoleSet::admin());

        let as_user = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/users")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &user))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(as_user.status(), StatusCode::FORBIDDEN);
        let body = json_body(as_user).await;
        assert_eq!(body["detail"], "Insufficient permissions");

        let as_admin = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/users")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &admin))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(as_admin.status(), StatusCode::OK);
        assert_eq!(json_body(as_admin).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn admin_can_create_user() {
        let app = test_app();
        let admin = Principal::from_email("root@b.com").with_roles(RoleSet::admin());

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/users")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &admin))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email": "new@b.com", "name": "New", "roles": ["guest"]}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["email"], "new@b.com");
        assert_eq!(body["roles"], serde_json::json!(["guest"]));
    }

    #[tokio::test]
    async fn create_user_rejects_invalid_email() {
        let app = test_app();
        let admin = Principal::from_email("root@b.com").with_roles(RoleSet::admin());

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/users")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &admin))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email": "nope", "name": "New"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_user_without_json_content_type_is_json_bad_request() {
        let app = test_app();
        let admin = Principal::from_email("root@b.com").with_roles(RoleSet::admin());

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/users")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &admin))
                    .body(Body::from(r#"{"email": "new@b.com", "name": "New"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], 400);
        assert!(body["detail"].as_str().expect("detail").contains("Content-Type"));
    }

    #[tokio::test]
    async fn logout_clears_cookies() {
        let app = test_app();
        let principal = Principal::from_email("a@b.com");

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/logout")
                    .header(header::AUTHORIZATION, bearer(&app.tokens, &principal))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        for name in ["access_token", "refresh_token", "session_id"] {
            let cleared = cookie(&cookies, name).expect("cleared cookie");
            assert!(cleared.contains("Max-Age=0"), "{cleared}");
        }
        let body = json_body(response).await;
        assert_eq!(body["message"], "Logged out successfully");
    }

    #[tokio::test]
    async fn health_reports_configuration() {
        let configured = test_app();
        let response = configured
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "authentication");
        assert_eq!(body["msal_configured"], true);

        let unconfigured = test_app_with(
            ProviderCapability::Unconfigured {
                reason: "missing client_id".to_string(),
            },
            false,
        );
        let response = unconfigured
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["msal_configured"], false);
    }

    #[tokio::test]
    async fn health_reports_broken_provider_as_unhealthy() {
        let app = test_app_with(ProviderCapability::Configured(Arc::new(BrokenProvider)), false);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["error"], "An internal error occurred.");
        assert!(body.get("msal_configured").is_none());
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let app = test_app_with(ProviderCapability::Configured(Arc::new(FakeProvider)), true);

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let headers = response.headers();
        assert_eq!(
            headers.get(X_CONTENT_TYPE_OPTIONS).map(|v| v.as_bytes()),
            Some(&b"nosniff"[..])
        );
        assert_eq!(headers.get(X_FRAME_OPTIONS).map(|v| v.as_bytes()), Some(&b"DENY"[..]));
        assert!(headers.get(REFERRER_POLICY).is_some());
        assert!(headers.get(CONTENT_SECURITY_POLICY).is_some());
        assert!(headers.get(STRICT_TRANSPORT_SECURITY).is_some());
    }

    #[tokio::test]
    async fn hsts_is_only_sent_when_https_only() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.headers().get(STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_with_credentials() {
        let app = test_app();

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/auth/me")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let headers = response.headers();
        assert_eq!(
            headers
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .map(|v| v.as_bytes()),
            Some(&b"http://localhost:3000"[..])
        );
        assert_eq!(
            headers
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .map(|v| v.as_bytes()),
            Some(&b"true"[..])
        );
    }
}
