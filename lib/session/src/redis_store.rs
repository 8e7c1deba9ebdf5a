//! Redis-backed session store.
//!
//! Records are stored as JSON under `session:<id>` with a native `EX` expiry.
//! Consumption runs as a Lua script so the state comparison and the delete
//! happen in one server-side step.
//!
//! The store is generic over the connection so any
//! [`ConnectionLike`](redis::aio::ConnectionLike) can stand in for the
//! multiplexed client connection.

use async_trait::async_trait;
use chrono::Duration;
use redis::Script;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use rootcause::prelude::Report;
use tracing::{error, instrument, warn};

use crate::error::SessionStoreError;
use crate::record::{SessionId, SessionRecord};
use crate::store::SessionStore;

/// Deletes KEYS[1] only if its JSON `state` equals ARGV[1]. Returns 1 on delete.
const CONSUME_SCRIPT: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end
local ok, record = pcall(cjson.decode, raw)
if not ok or record['state'] ~= ARGV[1] then
    return 0
end
return redis.call('DEL', KEYS[1])
";

fn session_key(id: &SessionId) -> String {
    format!("session:{}", id.as_str())
}

/// Redis expiries are whole seconds and must be positive.
fn ttl_seconds(ttl: Duration) -> u64 {
    u64::try_from(ttl.num_seconds()).unwrap_or(0).max(1)
}

/// Session store backed by Redis.
pub struct RedisSessionStore<C = MultiplexedConnection> {
    connection: C,
    consume_script: Script,
}

impl RedisSessionStore {
    /// Connects to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, Report<SessionStoreError>> {
        let client = redis::Client::open(url).map_err(|e| SessionStoreError::Connection {
            details: e.to_string(),
        })?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SessionStoreError::Connection {
                details: e.to_string(),
            })?;

        Ok(Self::with_connection(connection))
    }
}

impl<C> RedisSessionStore<C>
where
    C: ConnectionLike + Clone + Send + Sync,
{
    /// Wraps an already established connection.
    pub fn with_connection(connection: C) -> Self {
        Self {
            connection,
            consume_script: Script::new(CONSUME_SCRIPT),
        }
    }

    async fn try_set(
        &self,
        id: &SessionId,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), Report<SessionStoreError>> {
        let payload =
            serde_json::to_string(record).map_err(|e| SessionStoreError::Serialization {
                details: e.to_string(),
            })?;

        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(session_key(id))
            .arg(payload)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionStoreError::Command {
                operation: "set",
                details: e.to_string(),
            })?;
        Ok(())
    }

    async fn try_get(
        &self,
        id: &SessionId,
    ) -> Result<Option<SessionRecord>, Report<SessionStoreError>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(session_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionStoreError::Command {
                operation: "get",
                details: e.to_string(),
            })?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let record =
            serde_json::from_str(&raw).map_err(|e| SessionStoreError::Serialization {
                details: e.to_string(),
            })?;
        Ok(Some(record))
    }

    async fn try_delete(&self, id: &SessionId) -> Result<(), Report<SessionStoreError>> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(session_key(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionStoreError::Command {
                operation: "delete",
                details: e.to_string(),
            })?;
        Ok(())
    }

    async fn try_consume(
        &self,
        id: &SessionId,
        expected_state: &str,
    ) -> Result<bool, Report<SessionStoreError>> {
        let mut conn = self.connection.clone();
        let removed: i64 = self
            .consume_script
            .key(session_key(id))
            .arg(expected_state)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| SessionStoreError::Command {
                operation: "consume",
                details: e.to_string(),
            })?;
        Ok(removed == 1)
    }
}

#[async_trait]
impl<C> SessionStore for RedisSessionStore<C>
where
    C: ConnectionLike + Clone + Send + Sync,
{
    #[instrument(skip(self, record), fields(session_id = %id))]
    async fn set(&self, id: &SessionId, record: &SessionRecord, ttl: Duration) {
        if let Err(report) = self.try_set(id, record, ttl).await {
            // Fail open on write: the later callback finds no session and is rejected.
            error!(error = %report, "failed to store session");
        }
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        match self.try_get(id).await {
            Ok(record) => record,
            Err(report) => {
                error!(error = %report, "failed to read session");
                None
            }
        }
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn delete(&self, id: &SessionId) {
        if let Err(report) = self.try_delete(id).await {
            warn!(error = %report, "failed to delete session");
        }
    }

    #[instrument(skip(self, expected_state), fields(session_id = %id))]
    async fn consume(&self, id: &SessionId, expected_state: &str) -> bool {
        match self.try_consume(id, expected_state).await {
            Ok(consumed) => consumed,
            Err(report) => {
                error!(error = %report, "failed to consume session");
                false
            }
        }
    }
}
