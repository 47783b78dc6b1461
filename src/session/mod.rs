//! Visitor sessions
//!
//! Session records are persisted through a `SessionStore` and addressed by a
//! signed cookie. Every request resaves its session, and a freshly created
//! session is written before the request continues.

mod middleware;
mod store;

pub use middleware::{session_stage, signing_key, SessionStage};
pub use store::{spawn_sweeper, PgSessionStore, SessionStore};

#[cfg(test)]
pub use store::MemorySessionStore;

use crate::error::AppError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "storefront.sid";

/// Session lifetime, also the cookie max-age
pub const SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24;

const SESSION_ID_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session store unavailable: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Session query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Corrupt session record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// One visitor's persisted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub data: Map<String, Value>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A new, empty record with a random id
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: generate_session_id(),
            data: Map::new(),
            expires_at: now + Duration::seconds(SESSION_MAX_AGE_SECS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Push the expiry out by a full lifetime from `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.expires_at = now + Duration::seconds(SESSION_MAX_AGE_SECS);
    }
}

fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug)]
struct SessionState {
    record: SessionRecord,
    destroyed: bool,
}

/// The current request's session, shared between the session stage and handlers
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

/// What the session stage must do once the handler has finished
#[derive(Debug)]
pub(crate) enum SessionOutcome {
    Save(SessionRecord),
    Destroy(String),
}

impl Session {
    pub(crate) fn new(record: SessionRecord) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                record,
                destroyed: false,
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.state().record.id.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state().record.data.get(key).cloned()
    }

    #[cfg(test)]
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.state().record.data.insert(key.into(), value);
    }

    /// Invalidate the session; the store entry and cookie are dropped after the response
    pub fn destroy(&self) {
        self.state().destroyed = true;
    }

    pub(crate) fn outcome(&self) -> SessionOutcome {
        let state = self.state();
        if state.destroyed {
            SessionOutcome::Destroy(state.record.id.clone())
        } else {
            SessionOutcome::Save(state.record.clone())
        }
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session stage is not installed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_expires_after_a_day() {
        let now = Utc::now();
        let record = SessionRecord::new(now);
        assert_eq!(record.id.len(), SESSION_ID_LEN);
        assert!(record.id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(record.expires_at - now, Duration::hours(24));
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + Duration::hours(24)));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let now = Utc::now();
        assert_ne!(SessionRecord::new(now).id, SessionRecord::new(now).id);
    }

    #[test]
    fn test_touch_extends_expiry() {
        let now = Utc::now();
        let mut record = SessionRecord::new(now);
        let later = now + Duration::hours(5);
        record.touch(later);
        assert_eq!(record.expires_at, later + Duration::hours(24));
    }

    #[test]
    fn test_session_outcome() {
        let session = Session::new(SessionRecord::new(Utc::now()));
        session.insert("cart", json!([1, 2]));
        match session.outcome() {
            SessionOutcome::Save(record) => assert_eq!(record.data["cart"], json!([1, 2])),
            other => panic!("unexpected {:?}", other),
        }

        session.destroy();
        assert!(matches!(session.outcome(), SessionOutcome::Destroy(_)));
    }
}
