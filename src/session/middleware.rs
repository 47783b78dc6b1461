//! Session attachment stage

use super::{
    Session, SessionOutcome, SessionRecord, SessionStore, SESSION_COOKIE, SESSION_MAX_AGE_SECS,
};
use crate::error::AppError;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, Key, SignedCookieJar};
use chrono::Utc;
use sha2::{Digest, Sha512};
use std::sync::Arc;
use tracing::debug;

/// Derive a cookie signing key from a secret of any length
pub fn signing_key(secret: &str) -> Key {
    Key::from(Sha512::digest(secret.as_bytes()).as_slice())
}

/// State of the session stage
#[derive(Clone)]
pub struct SessionStage {
    store: Arc<dyn SessionStore>,
    key: Key,
}

impl SessionStage {
    pub fn new(store: Arc<dyn SessionStore>, secret: &str) -> Self {
        Self {
            store,
            key: signing_key(secret),
        }
    }
}

fn session_cookie(id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .secure(false)
        .max_age(time::Duration::seconds(SESSION_MAX_AGE_SECS))
        .build()
}

/// Resolve or create the visitor's session, run the rest of the chain, then
/// write the session back whether or not it changed.
pub async fn session_stage(
    State(stage): State<SessionStage>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jar = SignedCookieJar::from_headers(request.headers(), stage.key.clone());
    let now = Utc::now();

    let existing = match jar.get(SESSION_COOKIE) {
        Some(cookie) => stage.store.load(cookie.value()).await?,
        None => None,
    };

    let record = match existing {
        Some(record) if !record.is_expired(now) => record,
        stale => {
            if let Some(expired) = stale {
                stage.store.destroy(&expired.id).await?;
            }
            let record = SessionRecord::new(now);
            // uninitialized sessions are stored right away
            stage.store.save(&record).await?;
            debug!("Created session {}", record.id);
            record
        }
    };

    let session = Session::new(record);
    request.extensions_mut().insert(session.clone());

    let response = next.run(request).await;

    let jar = match session.outcome() {
        SessionOutcome::Save(mut record) => {
            record.touch(Utc::now());
            stage.store.save(&record).await?;
            jar.add(session_cookie(record.id))
        }
        SessionOutcome::Destroy(id) => {
            stage.store.destroy(&id).await?;
            debug!("Destroyed session {}", id);
            jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
        }
    };

    Ok((jar, response).into_response())
}
