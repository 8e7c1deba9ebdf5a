//! Authentication module for the portcullis server.
//!
//! This module provides:
//! - The OAuth2 authorization-code client for the identity provider
//! - The callback state machine that turns a provider code into tokens
//! - Bearer-token extractors for Axum routes
//! - The `/auth` routes
//!
//! # Login flow
//!
//! Login stores a short-lived session record holding the CSRF state and
//! hands the browser the provider URL plus a `session_id` cookie. The
//! provider redirects back to the callback, which checks the state against
//! the record, exchanges the code, mints the application's own token pair,
//! and consumes the record. Every later request carries the access token,
//! and no server-side state is kept for authenticated users.

pub mod callback;
pub mod middleware;
pub mod provider;
pub mod routes;

use portcullis_access::{
    AccessGuard, ProviderCapability, ProviderConfig, TokenService,
};
use portcullis_session::{MemorySessionStore, RedisSessionStore, SessionStore};
use rootcause::prelude::Report;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ServerConfig, SessionBackend, SessionStoreConfig};
use crate::error::StartupError;

pub use callback::{CallbackHandler, CallbackOutcome, CallbackParams};
pub use middleware::{OptionalUser, RequireActiveUser, RequireAdmin, RequireRole, RequireUser};
pub use provider::OAuth2Provider;

/// Shared application state.
pub struct AppState {
    /// Login session storage.
    pub sessions: Arc<dyn SessionStore>,
    /// The identity provider, if configured.
    pub provider: ProviderCapability,
    /// Token minting and verification.
    pub tokens: TokenService,
    /// Per-request access checks.
    pub guard: AccessGuard,
    /// Whether cookies are always marked Secure.
    pub https_only: bool,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        provider: ProviderCapability,
        tokens: TokenService,
        https_only: bool,
    ) -> Self {
        Self {
            sessions,
            provider,
            guard: AccessGuard::new(tokens.clone()),
            tokens,
            https_only,
        }
    }

    /// Builds the state from configuration, connecting the session store.
    ///
    /// # Errors
    ///
    /// Returns an error if the token configuration is unusable or the
    /// configured session store cannot be reached.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, Report<StartupError>> {
        let tokens = TokenService::new(&config.token).map_err(|e| StartupError::Configuration {
            details: e.to_string(),
        })?;
        let sessions = connect_session_store(&config.session_store).await?;
        let provider = provider_capability(&config.provider);

        Ok(Self::new(sessions, provider, tokens, config.https_only))
    }
}

/// Decides whether login can be offered with this configuration.
#[must_use]
pub fn provider_capability(config: &ProviderConfig) -> ProviderCapability {
    if !config.is_complete() {
        let reason = format!("missing {}", config.missing_fields().join(", "));
        warn!(%reason, "identity provider is not configured; login is disabled");
        return ProviderCapability::Unconfigured { reason };
    }

    info!(
        client_id = %config.client_id(),
        authority = %config.authority_url(),
        "identity provider configured"
    );
    ProviderCapability::Configured(Arc::new(OAuth2Provider::new(config.clone())))
}

/// Connects the configured session store backend.
///
/// # Errors
///
/// Returns an error if the redis backend is selected and unreachable.
pub async fn connect_session_store(
    config: &SessionStoreConfig,
) -> Result<Arc<dyn SessionStore>, Report<StartupError>> {
    match config.backend {
        SessionBackend::Redis => {
            let store = RedisSessionStore::connect(&config.redis_url)
                .await
                .map_err(|e| StartupError::SessionStore {
                    details: e.to_string(),
                })?;
            info!("using redis session store");
            Ok(Arc::new(store))
        }
        SessionBackend::Memory => {
            info!("using in-memory session store");
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}
