//! The provider callback, as an explicit state machine.
//!
//! ```text
//! AwaitingCode -> ValidatingState -> ExchangingCode -> MintingToken -> Done
//! ```
//!
//! Every stage may exit with an [`AuthError`]. The login session is only
//! consumed after tokens have been minted, and consumption is a
//! compare-and-delete, so of two callbacks racing on one session exactly one
//! reaches `Done`.

use chrono::Utc;
use portcullis_access::{
    AuthError, IdentityProvider, Principal, ProviderError, TokenPair, TokenService,
};
use portcullis_session::{SessionId, SessionRecord, SessionStore};
use serde::Deserialize;
use std::fmt;
use tracing::{error, info, warn};

/// Where a successful login lands when no redirect target was stored.
pub const DEFAULT_REDIRECT: &str = "/";

/// Query parameters the provider redirects back with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// The result of a completed callback.
#[derive(Debug)]
pub struct CallbackOutcome {
    pub principal: Principal,
    pub tokens: TokenPair,
    pub redirect_to: String,
}

/// Callback stages, each carrying what the next step needs.
enum Stage {
    AwaitingCode {
        params: CallbackParams,
        session_id: Option<SessionId>,
    },
    ValidatingState {
        code: String,
        state: String,
        session_id: SessionId,
    },
    ExchangingCode {
        code: String,
        session_id: SessionId,
        record: SessionRecord,
    },
    MintingToken {
        session_id: SessionId,
        record: SessionRecord,
        principal: Principal,
    },
    Done(CallbackOutcome),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitingCode { .. } => "awaiting_code",
            Self::ValidatingState { .. } => "validating_state",
            Self::ExchangingCode { .. } => "exchanging_code",
            Self::MintingToken { .. } => "minting_token",
            Self::Done(_) => "done",
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Drives one provider callback to completion.
pub struct CallbackHandler<'a> {
    sessions: &'a dyn SessionStore,
    provider: &'a dyn IdentityProvider,
    tokens: &'a TokenService,
}

impl<'a> CallbackHandler<'a> {
    /// Creates a handler over the given collaborators.
    pub fn new(
        sessions: &'a dyn SessionStore,
        provider: &'a dyn IdentityProvider,
        tokens: &'a TokenService,
    ) -> Self {
        Self {
            sessions,
            provider,
            tokens,
        }
    }

    /// Runs the callback for `params`, with the session ID from the
    /// request's cookie if there was one.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError` of the first stage that fails.
    pub async fn run(
        &self,
        params: CallbackParams,
        session_id: Option<SessionId>,
    ) -> Result<CallbackOutcome, AuthError> {
        let mut stage = Stage::AwaitingCode { params, session_id };
        loop {
            let name = stage.name();
            stage = match self.advance(stage).await {
                Ok(Stage::Done(outcome)) => return Ok(outcome),
                Ok(next) => next,
                Err(e) => {
                    warn!(stage = name, error = %e, "login callback failed");
                    return Err(e);
                }
            };
        }
    }

    async fn advance(&self, stage: Stage) -> Result<Stage, AuthError> {
        match stage {
            Stage::AwaitingCode { params, session_id } => {
                if let Some(error) = params.error {
                    return Err(AuthError::UpstreamAuth {
                        description: Some(params.error_description.unwrap_or(error)),
                    });
                }
                let (Some(code), Some(state)) = (
                    params.code.filter(|c| !c.is_empty()),
                    params.state.filter(|s| !s.is_empty()),
                ) else {
                    return Err(AuthError::InvalidRequest {
                        reason: "Missing authorization code or state".to_string(),
                    });
                };
                let session_id = session_id.ok_or(AuthError::InvalidSession)?;
                Ok(Stage::ValidatingState {
                    code,
                    state,
                    session_id,
                })
            }

            Stage::ValidatingState {
                code,
                state,
                session_id,
            } => {
                let record = self
                    .sessions
                    .get(&session_id)
                    .await
                    .filter(|record| record.matches_state(&state))
                    .ok_or(AuthError::InvalidState)?;
                Ok(Stage::ExchangingCode {
                    code,
                    session_id,
                    record,
                })
            }

            Stage::ExchangingCode {
                code,
                session_id,
                record,
            } => {
                let claims = self
                    .provider
                    .exchange_code(&code)
                    .await
                    .map_err(exchange_error)?;
                let principal = claims.to_principal(Utc::now())?;
                Ok(Stage::MintingToken {
                    session_id,
                    record,
                    principal,
                })
            }

            Stage::MintingToken {
                session_id,
                record,
                principal,
            } => {
                let tokens = self.tokens.mint(&principal)?;
                if !self.sessions.consume(&session_id, record.state()).await {
                    return Err(AuthError::InvalidState);
                }
                info!(email = %principal.email(), "user authenticated");
                Ok(Stage::Done(CallbackOutcome {
                    redirect_to: record
                        .redirect_url()
                        .unwrap_or(DEFAULT_REDIRECT)
                        .to_string(),
                    principal,
                    tokens,
                }))
            }

            Stage::Done(outcome) => Ok(Stage::Done(outcome)),
        }
    }
}

/// Maps a failed code exchange into the taxonomy. Codes are single-use, so
/// none of these are retried.
fn exchange_error(err: ProviderError) -> AuthError {
    match err {
        ProviderError::Rejected { error, description } => AuthError::UpstreamAuth {
            description: Some(description.unwrap_or(error)),
        },
        ProviderError::Configuration { details } => {
            error!(%details, "identity provider misconfigured");
            AuthError::Internal { details }
        }
        other => {
            error!(error = %other, "code exchange failed");
            AuthError::UpstreamAuth { description: None }
        }
    }
}
