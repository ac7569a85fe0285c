use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, MethodRouter};
use serde::Deserialize;
use tracing::{info, warn};

use crate::environment::Environment;
use crate::error::{AppError, AppResult};
use crate::identity::{HandshakeOutcome, IdentityStrategy};
use crate::session::Session;

use super::{CALLBACK_PATH, PUBLIC_ROOT};

/// Where a successful login lands when the session holds no return-to path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PostLoginTarget {
    #[default]
    AdminPath,
    Root,
    Fixed(String),
}

impl PostLoginTarget {
    pub fn resolve(&self, admin_path: &str) -> String {
        match self {
            PostLoginTarget::AdminPath => format!("/{}", admin_path),
            PostLoginTarget::Root => PUBLIC_ROOT.to_string(),
            PostLoginTarget::Fixed(path) => path.clone(),
        }
    }
}

/// Local, same-origin paths only.
fn safe_return_to(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// The login and callback routes.
#[derive(Debug, Clone)]
pub struct AuthGate {
    environment: Environment,
    strategy: IdentityStrategy,
    admin_path: String,
    post_login: PostLoginTarget,
}

impl AuthGate {
    pub fn new(environment: Environment, strategy: IdentityStrategy, admin_path: impl Into<String>) -> Self {
        Self { environment, strategy, admin_path: admin_path.into(), post_login: PostLoginTarget::default() }
    }

    pub fn with_post_login(mut self, target: PostLoginTarget) -> Self {
        self.post_login = target;
        self
    }

    pub fn admin_url(&self) -> String { format!("/{}", self.admin_path) }

    pub fn post_login(&self) -> &PostLoginTarget { &self.post_login }

    /// Development shortcut: login goes straight to the callback.
    pub fn dev_shortcut() -> MethodRouter {
        get(|| async { Redirect::to(CALLBACK_PATH) })
    }

    pub fn login_route(&self) -> MethodRouter {
        get(login).with_state(self.clone())
    }

    pub fn callback_route(&self) -> MethodRouter {
        get(callback).with_state(self.clone())
    }
}

async fn login(State(gate): State<AuthGate>, session: Result<Session, AppError>) -> AppResult<Response> {
    if gate.environment.is_development() {
        return Ok(Redirect::to(CALLBACK_PATH).into_response());
    }
    let session = session?;
    let provider = gate
        .strategy
        .provider()
        .ok_or_else(|| AppError::misconfigured("no_identity_provider", "no identity provider is registered"))?;
    let state = uuid::Uuid::new_v4().simple().to_string();
    session.update(|d| d.oauth_state = Some(state.clone()));
    Ok(Redirect::to(&provider.authorization_url(&state)).into_response())
}

async fn callback(
    State(gate): State<AuthGate>,
    Query(params): Query<CallbackParams>,
    session: Result<Session, AppError>,
) -> AppResult<Response> {
    if gate.environment.is_development() {
        return Ok(Redirect::to(&gate.admin_url()).into_response());
    }
    let session = session?;

    if let Some(error) = params.error.as_deref() {
        if error == "access_denied" {
            info!(target: "auth", "login declined at the identity provider");
            return Ok(Redirect::to(PUBLIC_ROOT).into_response());
        }
        let description = params.error_description.unwrap_or_default();
        return Err(AppError::identity(error.to_string(), description));
    }

    let expected = session.data().oauth_state;
    let (Some(code), Some(state)) = (params.code.as_deref(), params.state.as_deref()) else {
        warn!(target: "auth", "callback without code or state");
        return Ok(Redirect::to(PUBLIC_ROOT).into_response());
    };
    if expected.as_deref() != Some(state) {
        warn!(target: "auth", "callback state does not match the session");
        return Ok(Redirect::to(PUBLIC_ROOT).into_response());
    }

    let provider = gate
        .strategy
        .provider()
        .ok_or_else(|| AppError::misconfigured("no_identity_provider", "no identity provider is registered"))?;
    let user = match provider.exchange(code).await? {
        HandshakeOutcome::Authenticated(user) => user,
        HandshakeOutcome::NoUser => return Ok(Redirect::to(PUBLIC_ROOT).into_response()),
    };

    gate.strategy.log_in(&session, &user)?;
    session.update(|d| d.oauth_state = None);
    let target = session
        .take_return_to()
        .filter(|p| safe_return_to(p))
        .unwrap_or_else(|| gate.post_login.resolve(&gate.admin_path));
    info!(target: "auth", user = %user.id, %target, "login complete");
    Ok(Redirect::to(&target).into_response())
}
