//! Short-lived login session storage for portcullis.
//!
//! A login session binds the CSRF state handed to the identity provider to
//! the browser that started the login. It lives only between the login
//! redirect and the provider callback:
//! - created by login with a short TTL
//! - consumed exactly once by a successful callback
//! - otherwise reaped when its TTL runs out
//!
//! Two backends implement the same [`SessionStore`] contract:
//! - [`RedisSessionStore`]: durable, TTL enforced by Redis itself
//! - [`MemorySessionStore`]: in-process map with lazy expiry
//!
//! # Example
//!
//! ```
//! use chrono::Duration;
//! use portcullis_session::{MemorySessionStore, SessionId, SessionRecord, SessionStore};
//!
//! # tokio_test_block_on(async {
//! let store = MemorySessionStore::new();
//! let id = SessionId::generate();
//! let record = SessionRecord::new("csrf-state".to_string(), None, Duration::minutes(10));
//!
//! store.set(&id, &record, record.ttl()).await;
//! assert!(store.consume(&id, "csrf-state").await);
//! assert!(store.get(&id).await.is_none());
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod record;
pub mod redis_store;
pub mod store;

pub use error::SessionStoreError;
pub use memory::MemorySessionStore;
pub use record::{SessionId, SessionRecord};
pub use redis_store::RedisSessionStore;
pub use store::SessionStore;
