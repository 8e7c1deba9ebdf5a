//! Signed bearer credentials.
//!
//! `TokenService` mints, verifies, and refreshes the application's own access
//! and refresh tokens. It holds only immutable configuration, so one value can
//! be shared by every request without locking.
//!
//! Both token kinds are JWTs signed with the same HMAC secret. They are kept
//! apart by the `type` claim: a token only verifies where its own type is
//! expected.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::AuthError;
use crate::principal::{Principal, local_part};
use crate::role::{Role, RoleSet};

/// Configuration for token signing and lifetimes.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// HMAC signing secret.
    secret_key: String,
    /// JWT algorithm name. Default: "HS256"
    #[serde(default = "default_algorithm")]
    algorithm: String,
    /// Access token lifetime in minutes. Default: 30
    #[serde(default = "default_access_token_expire_minutes")]
    access_token_expire_minutes: i64,
    /// Refresh token lifetime in days. Default: 7
    #[serde(default = "default_refresh_token_expire_days")]
    refresh_token_expire_days: i64,
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_token_expire_minutes() -> i64 {
    30
}

fn default_refresh_token_expire_days() -> i64 {
    7
}

impl TokenConfig {
    /// Creates a configuration with default algorithm and lifetimes.
    #[must_use]
    pub fn new(secret_key: String) -> Self {
        Self {
            secret_key,
            algorithm: default_algorithm(),
            access_token_expire_minutes: default_access_token_expire_minutes(),
            refresh_token_expire_days: default_refresh_token_expire_days(),
        }
    }

    /// Returns the configured algorithm name.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the access token lifetime.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the lifetime is not positive or out of range.
    pub fn access_ttl(&self) -> Result<Duration, AuthError> {
        Duration::try_minutes(self.access_token_expire_minutes)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| AuthError::Configuration {
                reason: format!(
                    "access_token_expire_minutes must be positive and in range, got {}",
                    self.access_token_expire_minutes
                ),
            })
    }

    /// Returns the refresh token lifetime.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the lifetime is not positive or out of range.
    pub fn refresh_ttl(&self) -> Result<Duration, AuthError> {
        Duration::try_days(self.refresh_token_expire_days)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| AuthError::Configuration {
                reason: format!(
                    "refresh_token_expire_days must be positive and in range, got {}",
                    self.refresh_token_expire_days
                ),
            })
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field(
                "access_token_expire_minutes",
                &self.access_token_expire_minutes,
            )
            .field("refresh_token_expire_days", &self.refresh_token_expire_days)
            .finish()
    }
}

/// Kind of token, carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived credential for API calls.
    Access,
    /// Long-lived credential that can only mint new pairs.
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Decoded contents of a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the principal's email.
    pub sub: String,
    /// Display name (access tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Granted roles (access tokens only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    /// Token kind.
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    /// Builds the principal these claims describe.
    ///
    /// Missing names fall back to the email local part and missing roles to
    /// the default set.
    #[must_use]
    pub fn principal(&self) -> Principal {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| local_part(&self.sub).to_string());
        Principal::new(self.sub.clone(), name).with_roles(RoleSet::new(self.roles.iter().copied()))
    }
}

/// An access token and its matching refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    /// Always "bearer".
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_token: String,
}

/// Mints and verifies the application's bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    /// Creates a token service from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the secret is empty, the algorithm is not
    /// an HMAC algorithm, or a lifetime is unusable.
    pub fn new(config: &TokenConfig) -> Result<Self, AuthError> {
        let algorithm =
            config
                .algorithm
                .parse::<Algorithm>()
                .map_err(|_| AuthError::Configuration {
                    reason: format!("unknown signing algorithm '{}'", config.algorithm),
                })?;
        Self::with_ttls(
            &config.secret_key,
            algorithm,
            config.access_ttl()?,
            config.refresh_ttl()?,
        )
    }

    /// Creates a token service with explicit lifetimes.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the secret is empty, the algorithm is not
    /// an HMAC algorithm, or a lifetime is not positive or would overflow a
    /// timestamp.
    pub fn with_ttls(
        secret: &str,
        algorithm: Algorithm,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Configuration {
                reason: "token signing secret is empty".to_string(),
            });
        }
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::Configuration {
                reason: format!("signing algorithm {algorithm:?} needs a key pair, not a secret"),
            });
        }

        for (name, ttl) in [("access", access_ttl), ("refresh", refresh_ttl)] {
            if ttl <= Duration::zero() || Utc::now().checked_add_signed(ttl).is_none() {
                return Err(AuthError::Configuration {
                    reason: format!("{name} token lifetime must be positive and in range"),
                });
            }
        }

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        })
    }

    /// Returns the access token lifetime.
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Returns the refresh token lifetime.
    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mints an access/refresh pair for `principal`.
    ///
    /// Roles and name go into the access token only.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if signing fails.
    pub fn mint(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        let now = Utc::now();

        let access = Claims {
            sub: principal.email().to_string(),
            name: Some(principal.name().to_string()),
            roles: principal.roles().roles().to_vec(),
            token_type: TokenType::Access,
            iat: now.timestamp(),
            exp: expiry(now, self.access_ttl)?,
        };
        let refresh = Claims {
            sub: principal.email().to_string(),
            name: None,
            roles: Vec::new(),
            token_type: TokenType::Refresh,
            iat: now.timestamp(),
            exp: expiry(now, self.refresh_ttl)?,
        };

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl.num_seconds(),
            refresh_token: self.sign(&refresh)?,
        })
    }

    /// Verifies `token` and checks that it is of the `expected` type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the signature is wrong, the token has
    /// expired, the claims are malformed, or the type does not match.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!(error = %e, expected = %expected, "token verification failed");
                AuthError::InvalidToken {
                    reason: e.to_string(),
                }
            })?;
        let claims = data.claims;

        if claims.token_type != expected {
            debug!(
                expected = %expected,
                actual = %claims.token_type,
                "token type mismatch"
            );
            return Err(AuthError::InvalidToken {
                reason: format!("expected {expected} token, got {}", claims.token_type),
            });
        }
        if claims.sub.is_empty() {
            return Err(AuthError::InvalidToken {
                reason: "missing subject".to_string(),
            });
        }

        Ok(claims)
    }

    /// Exchanges a refresh token for a fresh pair.
    ///
    /// Only the subject survives: the new access token carries a name derived
    /// from the email and the default `{user}` role set, whatever roles the
    /// original login had. The presented refresh token stays valid until it
    /// expires.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if `refresh_token` does not verify as a refresh
    /// token, or `Internal` if signing fails.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.verify(refresh_token, TokenType::Refresh)?;
        let principal = Principal::from_email(&claims.sub);
        self.mint(&principal)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(self.algorithm), claims, &self.encoding_key).map_err(
            |e| AuthError::Internal {
                details: format!("failed to sign {} token: {e}", claims.token_type),
            },
        )
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<i64, AuthError> {
    now.checked_add_signed(ttl)
        .map(|at| at.timestamp())
        .ok_or_else(|| AuthError::Internal {
            details: "token expiry out of range".to_string(),
        })
}
