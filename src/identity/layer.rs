use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::session::{PassportState, Session};

use super::assertion::IdentityAssertion;
use super::provider::IdentityProvider;

fn store_whole_profile(user: &IdentityAssertion) -> AppResult<serde_json::Value> {
    serde_json::to_value(user).map_err(|e| AppError::internal("serialize_user", e.to_string()))
}

fn restore_whole_profile(value: &serde_json::Value) -> Option<IdentityAssertion> {
    serde_json::from_value(value.clone()).ok()
}

/// Identity strategy registered with the host: the provider plus the rules
/// for putting a user into, and reading it back out of, the session. The
/// whole profile goes into the session unchanged and comes back unchanged.
#[derive(Clone)]
pub struct IdentityStrategy {
    provider: Option<Arc<dyn IdentityProvider>>,
}

impl std::fmt::Debug for IdentityStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStrategy").field("provider", &self.provider.is_some()).finish()
    }
}

impl IdentityStrategy {
    pub fn new(provider: Option<Arc<dyn IdentityProvider>>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> Option<&Arc<dyn IdentityProvider>> { self.provider.as_ref() }

    /// Store `user` in the session under a freshly minted session id.
    pub fn log_in(&self, session: &Session, user: &IdentityAssertion) -> AppResult<()> {
        let value = store_whole_profile(user)?;
        session.regenerate()?;
        session.update(|d| d.passport = Some(PassportState { user: value }));
        debug!(target: "auth", user = %user.id, "identity stored in session");
        Ok(())
    }

    pub fn current_user(&self, session: &Session) -> Option<IdentityAssertion> {
        let value = session.passport_user()?;
        let user = restore_whole_profile(&value);
        if user.is_none() {
            warn!(target: "auth", "session holds an identity that no longer deserializes");
        }
        user
    }
}

/// Identity restored from the session for this request, if any.
#[derive(Debug, Clone, Default)]
pub struct CurrentIdentity(pub Option<IdentityAssertion>);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentIdentity>().cloned().unwrap_or_default())
    }
}

/// Restores the session identity into [`CurrentIdentity`]. Runs after the
/// session middleware.
pub async fn identity_session(State(strategy): State<IdentityStrategy>, mut req: Request, next: Next) -> Response {
    let identity = match req.extensions().get::<Session>() {
        Some(session) => strategy.current_user(session),
        None => {
            warn!(target: "auth", "identity layer mounted without a session");
            None
        }
    };
    req.extensions_mut().insert(CurrentIdentity(identity));
    next.run(req).await
}
