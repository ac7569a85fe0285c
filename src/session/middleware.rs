use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{AppError, AppResult};

use super::cookie::CookieJar;
use super::factory::SessionHandle;
use super::store::SessionData;

#[derive(Debug, Clone)]
pub(crate) struct SessionSnapshot {
    pub id: String,
    pub data: SessionData,
    pub is_new: bool,
    pub modified: bool,
    /// Id the session was loaded under, when it has since been regenerated.
    pub replaced: Option<String>,
}

/// The current request's session. Handlers and later middleware share one
/// instance through the request extensions.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionSnapshot>>,
}

impl Session {
    fn new(id: String, data: SessionData, is_new: bool) -> Self {
        let snap = SessionSnapshot { id, data, is_new, modified: false, replaced: None };
        Self { state: Arc::new(Mutex::new(snap)) }
    }

    pub fn id(&self) -> String { self.state.lock().id.clone() }

    pub fn is_new(&self) -> bool { self.state.lock().is_new }

    pub fn data(&self) -> SessionData { self.state.lock().data.clone() }

    /// Mutate the session data; the session is saved at the end of the request.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut guard = self.state.lock();
        guard.modified = true;
        f(&mut guard.data)
    }

    /// Remove and return the stored post-login target.
    pub fn take_return_to(&self) -> Option<String> {
        let mut guard = self.state.lock();
        let out = guard.data.return_to.take();
        if out.is_some() {
            guard.modified = true;
        }
        out
    }

    pub fn passport_user(&self) -> Option<serde_json::Value> {
        self.state.lock().data.passport.as_ref().map(|p| p.user.clone())
    }

    /// Move the session's data to a fresh id. The old id is dropped from the
    /// store when the session is committed.
    pub fn regenerate(&self) -> AppResult<()> {
        let fresh = SessionHandle::new_session_id()?;
        let mut guard = self.state.lock();
        let old = std::mem::replace(&mut guard.id, fresh);
        if !guard.is_new && guard.replaced.is_none() {
            guard.replaced = Some(old);
        }
        guard.is_new = true;
        guard.modified = true;
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot { self.state.lock().clone() }
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
            .ok_or_else(|| AppError::internal("session_missing", "session middleware is not mounted for this route"))
    }
}

/// Load the session named by the signed cookie (or start a new one), run the
/// rest of the stack, then persist it. A store failure on either side is
/// forwarded as the request's error.
pub async fn session_middleware(
    State(handle): State<SessionHandle>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let jar = match req.extensions().get::<CookieJar>() {
        Some(jar) => jar.clone(),
        None => {
            warn!(target: "session", "cookie parser is not mounted ahead of the session middleware");
            CookieJar::default()
        }
    };
    let loaded = match handle.session_id_from(&jar) {
        Some(sid) => handle.store().load(&sid).await?.map(|data| (sid, data)),
        None => None,
    };
    let session = match loaded {
        Some((sid, data)) => Session::new(sid, data, false),
        None => Session::new(SessionHandle::new_session_id()?, SessionData::default(), true),
    };
    let request_headers = req.headers().clone();
    req.extensions_mut().insert(session.clone());
    let mut resp = next.run(req).await;
    handle.commit(&session, &request_headers, &mut resp).await?;
    Ok(resp)
}
