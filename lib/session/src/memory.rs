//! In-process session store.
//!
//! Entries carry their own expiry timestamp. Expiry is enforced lazily on
//! read, and [`MemorySessionStore::purge_expired`] lets a background task
//! reclaim entries nobody comes back for.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::record::{SessionId, SessionRecord};
use crate::store::SessionStore;

#[derive(Debug)]
struct Entry {
    record: SessionRecord,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session store backed by a mutex-guarded map.
///
/// Only suitable for a single process: records are lost on restart and are
/// not shared between replicas.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<SessionId, Entry>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns true if no entries are stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(&self, id: &SessionId, record: &SessionRecord, ttl: Duration) {
        let entry = Entry {
            record: record.clone(),
            expires_at: Utc::now() + ttl,
        };
        self.entries.lock().await.insert(id.clone(), entry);
    }

    async fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        let mut entries = self.entries.lock().await;
        let expired = entries.get(id)?.is_expired(Utc::now());
        if expired {
            entries.remove(id);
            debug!(session_id = %id, "dropped expired session on read");
            return None;
        }
        entries.get(id).map(|entry| entry.record.clone())
    }

    async fn delete(&self, id: &SessionId) {
        self.entries.lock().await.remove(id);
    }

    async fn consume(&self, id: &SessionId, expected_state: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(id) else {
            return false;
        };
        if entry.is_expired(Utc::now()) {
            entries.remove(id);
            return false;
        }
        if !entry.record.matches_state(expected_state) {
            return false;
        }
        entries.remove(id).is_some()
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}
