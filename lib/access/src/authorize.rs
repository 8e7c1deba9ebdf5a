//! Login URL construction and CSRF state.
//!
//! Whether login is available at all is explicit: [`ProviderCapability`] is
//! either a configured provider or `Unconfigured`, and asking an unconfigured
//! capability for a URL fails with `AuthError::Configuration`. That error is
//! kept distinct from every other failure so health checks can report
//! "not configured" instead of "broken".

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use tracing::error;

use crate::error::AuthError;
use crate::provider::IdentityProvider;

/// Bytes of entropy in a generated CSRF state.
pub const STATE_BYTES: usize = 32;

/// Generates a random, URL-safe CSRF state (43 characters).
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A provider login URL and the state it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// The identity provider, if one is configured.
#[derive(Clone)]
pub enum ProviderCapability {
    Configured(Arc<dyn IdentityProvider>),
    Unconfigured { reason: String },
}

impl ProviderCapability {
    /// Returns true if a provider is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }

    /// Returns the provider.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no provider is configured.
    pub fn provider(&self) -> Result<&Arc<dyn IdentityProvider>, AuthError> {
        match self {
            Self::Configured(provider) => Ok(provider),
            Self::Unconfigured { reason } => Err(AuthError::Configuration {
                reason: reason.clone(),
            }),
        }
    }

    /// Builds the provider login URL.
    ///
    /// Uses `state` when given and non-empty, otherwise generates a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no provider is configured, or `Internal`
    /// if the configured provider cannot build the URL.
    pub fn authorization_url(
        &self,
        state: Option<String>,
    ) -> Result<AuthorizationRequest, AuthError> {
        let provider = self.provider()?;
        let state = state
            .filter(|s| !s.is_empty())
            .unwrap_or_else(generate_state);

        let url = provider.authorization_url(&state).map_err(|e| {
            error!(error = %e, "failed to build authorization URL");
            AuthError::Internal {
                details: e.to_string(),
            }
        })?;

        Ok(AuthorizationRequest { url, state })
    }
}

impl std::fmt::Debug for ProviderCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configured(_) => f.write_str("Configured"),
            Self::Unconfigured { reason } => {
                f.debug_struct("Unconfigured").field("reason", reason).finish()
            }
        }
    }
}
