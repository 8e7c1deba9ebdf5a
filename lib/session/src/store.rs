//! The storage contract shared by all session backends.

use async_trait::async_trait;
use chrono::Duration;

use crate::record::{SessionId, SessionRecord};

/// TTL-keyed store for login session records.
///
/// Failures never surface to callers. A failed write is logged and the
/// session simply will not be found later; a failed read reports the session
/// as absent. Since every callback requires a present session whose state
/// matches, both failure modes end in a rejected login rather than an
/// accepted one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores `record` under `id`, replacing any previous record, for `ttl`.
    async fn set(&self, id: &SessionId, record: &SessionRecord, ttl: Duration);

    /// Returns the record for `id` if it exists and has not expired.
    async fn get(&self, id: &SessionId) -> Option<SessionRecord>;

    /// Removes the record for `id`, if any.
    async fn delete(&self, id: &SessionId);

    /// Atomically removes the record for `id` if, and only if, it is present,
    /// unexpired, and holds `expected_state`.
    ///
    /// Returns true for exactly one caller per record: when two callbacks
    /// race on the same session, the loser gets false.
    async fn consume(&self, id: &SessionId, expected_state: &str) -> bool;

    /// Drops expired records, returning how many were removed.
    ///
    /// Backends with native expiry have nothing to do here.
    async fn purge_expired(&self) -> usize {
        0
    }
}
