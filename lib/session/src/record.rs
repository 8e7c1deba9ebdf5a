//! Login session identifiers and records.
//!
//! A record is created when a login starts and holds the CSRF state that
//! the provider callback must echo back, plus where to send the user once
//! the login completes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Bytes of entropy in a generated session ID.
const SESSION_ID_BYTES: usize = 32;

/// Opaque identifier of a login session.
///
/// Carried in the `session_id` cookie. Distinct from the CSRF state so that
/// knowing the state (it appears in the provider URL) never reveals the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session ID from an existing string (e.g. a cookie value).
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh random, URL-safe session ID.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// State kept between login and callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// CSRF state sent to the identity provider.
    state: String,
    /// Where to send the user after a successful login.
    redirect_url: Option<String>,
    /// When the login was started.
    created_at: DateTime<Utc>,
    /// Lifetime of the record in seconds.
    ttl_seconds: i64,
}

impl SessionRecord {
    /// Creates a record for a login starting now.
    #[must_use]
    pub fn new(state: String, redirect_url: Option<String>, ttl: Duration) -> Self {
        Self {
            state,
            redirect_url,
            created_at: Utc::now(),
            ttl_seconds: ttl.num_seconds(),
        }
    }

    /// Returns the CSRF state.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Returns true if `state` is the value this record was created with.
    #[must_use]
    pub fn matches_state(&self, state: &str) -> bool {
        self.state == state
    }

    /// Returns the post-login redirect target, if one was requested.
    #[must_use]
    pub fn redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref()
    }

    /// Returns when the login was started.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the record's time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds)
    }
}
