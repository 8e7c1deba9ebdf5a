//! OAuth2 authorization-code client for the configured identity provider.
//!
//! Uses the `oauth2` crate against the authority's v2.0 endpoints. The
//! client is built per call from configuration, so building the login URL
//! never touches the network and a bad URL surfaces as an error at use
//! rather than at startup.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, ExtraTokenFields,
    RedirectUrl, RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse,
    TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
};
use portcullis_access::{IdentityClaims, IdentityProvider, ProviderConfig, ProviderError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Token response fields beyond the OAuth2 standard set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    /// The OpenID Connect ID token, as a compact JWT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

/// Type alias for the token response type.
type ProviderTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

/// Type alias for a client with no endpoints set yet.
type ProviderClient = Client<
    BasicErrorResponse,
    ProviderTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Scopes requested on every login, ahead of the configured ones.
///
/// Without `openid` the token endpoint returns no ID token.
const OIDC_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Authorization-code client for the identity provider.
#[derive(Debug, Clone)]
pub struct OAuth2Provider {
    config: ProviderConfig,
}

impl OAuth2Provider {
    /// Creates a provider client from configuration.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Returns the OpenID scopes followed by the configured scopes, without duplicates.
    #[must_use]
    pub fn request_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = OIDC_SCOPES.iter().map(|s| (*s).to_string()).collect();
        for scope in self.config.scopes() {
            if !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }
        scopes
    }

    fn base_client(&self) -> Result<ProviderClient, ProviderError> {
        let redirect_url = RedirectUrl::new(self.config.redirect_uri().to_string()).map_err(
            |e| ProviderError::Configuration {
                details: format!("invalid redirect URI: {e}"),
            },
        )?;

        Ok(
            ProviderClient::new(ClientId::new(self.config.client_id().to_string()))
                .set_client_secret(ClientSecret::new(self.config.client_secret().to_string()))
                .set_redirect_uri(redirect_url),
        )
    }
}

#[async_trait]
impl IdentityProvider for OAuth2Provider {
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        let auth_url = AuthUrl::new(self.config.authorize_endpoint()).map_err(|e| {
            ProviderError::Configuration {
                details: format!("invalid authorization URL: {e}"),
            }
        })?;
        let client = self.base_client()?.set_auth_uri(auth_url);

        let mut auth_request = client.authorize_url(|| CsrfToken::new(state.to_string()));
        for scope in self.request_scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope));
        }

        let (auth_url, _csrf_token) = auth_request.url();
        Ok(auth_url.to_string())
    }

    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<IdentityClaims, ProviderError> {
        let token_url =
            TokenUrl::new(self.config.token_endpoint()).map_err(|e| ProviderError::Configuration {
                details: format!("invalid token URL: {e}"),
            })?;
        let client = self.base_client()?.set_token_uri(token_url);

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProviderError::Configuration {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        let token_response: ProviderTokenResponse = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .add_extra_param("scope", self.request_scopes().join(" "))
            .request_async(&http_client)
            .await
            .map_err(request_error)?;

        let id_token = token_response
            .extra_fields()
            .id_token
            .as_deref()
            .ok_or_else(|| ProviderError::InvalidResponse {
                details: "no id_token in token response".to_string(),
            })?;

        let claims = decode_id_token_claims(id_token)?;
        debug!(has_email = claims.email().is_some(), "code exchanged");
        Ok(claims)
    }
}

fn request_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> ProviderError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let error = response.error().to_string();
            let description = response.error_description().cloned();
            warn!(%error, ?description, "identity provider rejected code exchange");
            ProviderError::Rejected { error, description }
        }
        RequestTokenError::Request(e) => ProviderError::Transport {
            details: e.to_string(),
        },
        RequestTokenError::Parse(e, _) => ProviderError::InvalidResponse {
            details: e.to_string(),
        },
        RequestTokenError::Other(details) => ProviderError::InvalidResponse { details },
    }
}

/// Reads the identity claims from an ID token's payload.
///
/// The token arrives directly from the token endpoint over TLS, so its
/// signature is not checked again here.
///
/// # Errors
///
/// Returns `InvalidResponse` if the token is not a three-part JWT or its
/// payload is not JSON.
pub fn decode_id_token_claims(id_token: &str) -> Result<IdentityClaims, ProviderError> {
    // JWT is base64url(header).base64url(payload).signature
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(ProviderError::InvalidResponse {
            details: "invalid JWT format".to_string(),
        });
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| ProviderError::InvalidResponse {
            details: format!("failed to decode JWT payload: {e}"),
        })?;

    serde_json::from_slice(&payload_bytes).map_err(|e| ProviderError::InvalidResponse {
        details: format!("failed to parse JWT payload: {e}"),
    })
}
