//! Identity provider configuration and boundary.
//!
//! The provider is an external collaborator: this crate only needs it to
//! build a login URL and to exchange an authorization code for identity
//! claims. The concrete OAuth2 client lives in the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;
use crate::principal::Principal;

/// Configuration for the external identity provider.
///
/// All fields have defaults so a missing provider section still
/// deserializes; [`ProviderConfig::is_complete`] decides whether login can
/// be offered at all.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OAuth2 client ID registered with the provider.
    #[serde(default)]
    client_id: String,
    /// OAuth2 client secret.
    #[serde(default)]
    client_secret: String,
    /// Directory tenant the application is registered in.
    #[serde(default)]
    tenant_id: String,
    /// Authority base URL. Default: `https://login.microsoftonline.com/{tenant_id}`
    #[serde(default)]
    authority: Option<String>,
    /// Redirect URI registered for the callback.
    /// Default: "http://localhost:8088/auth/callback"
    #[serde(default = "default_redirect_uri")]
    redirect_uri: String,
    /// Scopes to request, comma-separated. Default: "User.Read"
    #[serde(default = "default_scopes")]
    scopes: String,
}

fn default_redirect_uri() -> String {
    "http://localhost:8088/auth/callback".to_string()
}

fn default_scopes() -> String {
    "User.Read".to_string()
}

impl ProviderConfig {
    /// Creates a configuration with default authority, redirect URI, and scopes.
    #[must_use]
    pub fn new(client_id: String, client_secret: String, tenant_id: String) -> Self {
        Self {
            client_id,
            client_secret,
            tenant_id,
            authority: None,
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: String) -> Self {
        self.redirect_uri = redirect_uri;
        self
    }

    /// Sets the scopes from a comma-separated list.
    #[must_use]
    pub fn with_scopes(mut self, scopes: &str) -> Self {
        self.scopes = scopes.to_string();
        self
    }

    /// Sets the authority base URL.
    #[must_use]
    pub fn with_authority(mut self, authority: String) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Returns true if client ID, secret, and tenant are all present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.tenant_id.is_empty()
    }

    /// Returns the names of required fields that are missing.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_empty() {
            missing.push("client_id");
        }
        if self.client_secret.is_empty() {
            missing.push("client_secret");
        }
        if self.tenant_id.is_empty() {
            missing.push("tenant_id");
        }
        missing
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the tenant ID.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the authority base URL without a trailing slash.
    #[must_use]
    pub fn authority_url(&self) -> String {
        match &self.authority {
            Some(authority) if !authority.is_empty() => authority.trim_end_matches('/').to_string(),
            _ => format!("https://login.microsoftonline.com/{}", self.tenant_id),
        }
    }

    /// Returns the authorization endpoint.
    #[must_use]
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority_url())
    }

    /// Returns the token endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority_url())
    }

    /// Returns the redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the scopes, parsed from the comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("authority", &self.authority)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Identity claims returned by a successful code exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Provider object ID.
    #[serde(default)]
    pub oid: Option<String>,
    /// Provider tenant ID.
    #[serde(default)]
    pub tid: Option<String>,
}

impl IdentityClaims {
    /// Returns the email address: `preferred_username`, else `email`.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.preferred_username
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.email.as_deref().filter(|s| !s.is_empty()))
    }

    /// Builds the principal for a login completed at `logged_in_at`.
    ///
    /// # Errors
    ///
    /// Returns `MissingIdentity` if the claims carry no email address.
    pub fn to_principal(&self, logged_in_at: DateTime<Utc>) -> Result<Principal, AuthError> {
        let email = self.email().ok_or(AuthError::MissingIdentity)?;
        let name = self
            .name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(email);

        Ok(Principal::new(email.to_string(), name.to_string())
            .with_provider_ids(self.oid.clone(), self.tid.clone())
            .with_last_login(logged_in_at))
    }
}

/// Errors from the identity provider boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider could not be set up from its configuration.
    Configuration { details: String },
    /// The provider answered with an OAuth2 error.
    Rejected {
        error: String,
        description: Option<String>,
    },
    /// The provider could not be reached.
    Transport { details: String },
    /// The provider's answer could not be understood.
    InvalidResponse { details: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => {
                write!(f, "identity provider configuration error: {details}")
            }
            Self::Rejected { error, description } => match description {
                Some(description) => {
                    write!(f, "identity provider rejected login: {error}: {description}")
                }
                None => write!(f, "identity provider rejected login: {error}"),
            },
            Self::Transport { details } => {
                write!(f, "identity provider unreachable: {details}")
            }
            Self::InvalidResponse { details } => {
                write!(f, "invalid identity provider response: {details}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// The authorization-code capability of an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Builds the provider login URL carrying `state`. Makes no network call.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built from configuration.
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError>;

    /// Exchanges an authorization code for identity claims.
    ///
    /// Codes are single-use, so callers must not retry this.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` when the provider reports an error, or another
    /// variant when the exchange could not be completed.
    async fn exchange_code(&self, code: &str) -> Result<IdentityClaims, ProviderError>;
}
