use axum::extract::{OriginalUri, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::environment::Environment;
use crate::error::{AppError, AppResult};
use crate::identity::{AuthorizedPrincipal, CurrentIdentity, IdentityAssertion};
use crate::session::Session;

use super::{LOGIN_PATH, PUBLIC_ROOT};

/// An administrator as the directory stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl AdminRecord {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn principal(&self) -> AuthorizedPrincipal {
        AuthorizedPrincipal { display_name: self.display_name(), email: self.email.clone() }
    }
}

/// Read-only administrator lookup. Safe to call concurrently.
pub trait AdminDirectory: Send + Sync {
    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, AppResult<Option<AdminRecord>>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow(AuthorizedPrincipal),
    /// No identity in the session: send the caller to login.
    Login,
    /// Identity known but not an administrator.
    Deny,
}

impl AuthDecision {
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            AuthDecision::Allow(_) => None,
            AuthDecision::Login => Some(LOGIN_PATH),
            AuthDecision::Deny => Some(PUBLIC_ROOT),
        }
    }
}

/// The per-request authorization predicate, chosen once at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAuthorizer {
    /// Development: the fixed identity stands in for whatever the session holds.
    DevelopmentBypass { email: String },
    SessionChecked,
}

impl AdminAuthorizer {
    pub fn for_environment(env: Environment, dev_email: Option<&str>) -> AppResult<Self> {
        if !env.is_development() {
            return Ok(AdminAuthorizer::SessionChecked);
        }
        match dev_email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => Ok(AdminAuthorizer::DevelopmentBypass { email: email.to_string() }),
            None => Err(AppError::misconfigured("missing_env", "DEV_EMAIL is required in development")),
        }
    }

    pub async fn authorize(&self, identity: Option<&IdentityAssertion>, directory: &dyn AdminDirectory) -> AuthDecision {
        let email = match self {
            AdminAuthorizer::DevelopmentBypass { email } => email.as_str(),
            AdminAuthorizer::SessionChecked => match identity {
                None => return AuthDecision::Login,
                Some(user) => match user.primary_email() {
                    Some(e) => e,
                    None => {
                        debug!(target: "auth", user = %user.id, "identity carries no email");
                        return AuthDecision::Deny;
                    }
                },
            },
        };
        match directory.find_by_email(email).await {
            Ok(Some(record)) => AuthDecision::Allow(record.principal()),
            Ok(None) => {
                debug!(target: "auth", email, "no administrator record");
                AuthDecision::Deny
            }
            Err(e) => {
                warn!(target: "auth", email, "administrator lookup failed: {}", e);
                AuthDecision::Deny
            }
        }
    }
}

/// Run the predicate for one request. Allowed requests carry the
/// [`AuthorizedPrincipal`] on to the handler; a login redirect remembers the
/// requested URL as the session's return-to path.
pub async fn guard_request(
    authorizer: &AdminAuthorizer,
    directory: &dyn AdminDirectory,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = req.extensions().get::<CurrentIdentity>().and_then(|c| c.0.clone());
    let decision = authorizer.authorize(identity.as_ref(), directory).await;
    match decision {
        AuthDecision::Allow(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        AuthDecision::Login => {
            let wanted = req
                .extensions()
                .get::<OriginalUri>()
                .map(|u| u.0.to_string())
                .unwrap_or_else(|| req.uri().to_string());
            match req.extensions().get::<Session>() {
                Some(session) => session.update(|d| d.return_to = Some(wanted)),
                None => warn!(target: "auth", "no session to remember the requested page in"),
            }
            Redirect::to(LOGIN_PATH).into_response()
        }
        AuthDecision::Deny => Redirect::to(PUBLIC_ROOT).into_response(),
    }
}
