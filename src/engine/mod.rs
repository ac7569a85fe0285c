//! The in-process CMS engine the boot wires up.
//!
//! One [`Engine`] exists per boot and is shared by `Arc` with every router and
//! middleware that needs it. Its session wiring is bound once, to the same
//! [`SessionHandle`] the host's session middleware uses, and the admin routers
//! refuse to build before that binding exists.

mod admin;
mod models;
mod options;

use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn_with_state, map_response};
use axum::routing::get;
use axum::Router;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{info, warn};

use crate::access::{enforce_cross_origin, AccessPolicy, CrossOriginPolicy, SharedPolicy};
use crate::auth::{AdminAuthorizer, AdminDirectory, AdminRecord};
use crate::datastore::{self, DataStoreConnection};
use crate::error::{AppError, AppResult};
use crate::session::SessionHandle;

pub use models::{ImportReport, ModelDefinition, ModelRegistry};
pub use options::{CloudinaryOptions, EngineOptions, EngineSettings, EngineUtils, Locals};

pub struct Engine {
    options: RwLock<EngineOptions>,
    authorizer: AdminAuthorizer,
    models: ModelRegistry,
    session: OnceCell<SessionHandle>,
    policy: SharedPolicy,
    connection: Mutex<Option<DataStoreConnection>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("brand", &self.options.read().brand)
            .field("authorizer", &self.authorizer)
            .field("models", &self.models.len())
            .field("session_bound", &self.session.get().is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn init(options: EngineOptions, authorizer: AdminAuthorizer) -> Arc<Self> {
        info!(target: "engine", brand = %options.brand, root = %options.module_root.display(), "engine initialised");
        Arc::new(Self {
            options: RwLock::new(options),
            authorizer,
            models: ModelRegistry::default(),
            session: OnceCell::new(),
            policy: SharedPolicy::default(),
            connection: Mutex::new(None),
        })
    }

    pub fn options(&self) -> EngineOptions { self.options.read().clone() }

    pub fn authorizer(&self) -> &AdminAuthorizer { &self.authorizer }

    pub fn models(&self) -> &ModelRegistry { &self.models }

    /// Import `<module root>/models`. Safe to repeat.
    pub async fn import_models(&self) -> AppResult<ImportReport> {
        let dir = self.options.read().module_root.join("models");
        self.models.import_dir(&dir).await
    }

    pub fn set(&self, key: &str, value: Value) -> AppResult<()> {
        self.options.write().set(key, value)
    }

    pub fn apply_settings(&self, settings: &EngineSettings) -> AppResult<()> {
        let mut opts = self.options.write();
        for (key, value) in settings.iter() {
            opts.set(key, value.clone())?;
        }
        Ok(())
    }

    /// Bind the engine's session wiring. Binding the same handle again is a
    /// no-op; a different handle is refused.
    pub fn init_session(&self, handle: SessionHandle) -> AppResult<()> {
        if !self.options.read().session {
            return Err(AppError::misconfigured("session_disabled", "engine was initialised without session support"));
        }
        match self.session.get() {
            Some(bound) if bound.same_as(&handle) => Ok(()),
            Some(_) => Err(AppError::session("session_already_bound", "engine is already bound to another session handle")),
            None => {
                let _ = self.session.set(handle);
                Ok(())
            }
        }
    }

    pub fn session(&self) -> Option<&SessionHandle> { self.session.get() }

    /// Public admin assets.
    pub fn static_router(self: &Arc<Self>) -> Router {
        Router::new().route("/static/{*path}", get(admin::static_asset)).with_state(self.clone())
    }

    /// Admin pages and list api, behind the authorization predicate.
    pub fn dynamic_router(self: &Arc<Self>) -> AppResult<Router> {
        let handle = self
            .session
            .get()
            .cloned()
            .ok_or_else(|| AppError::misconfigured("session_not_bound", "admin routers need the engine session first"))?;
        let frame_guard = self.options.read().frame_guard;
        let mut router = Router::new()
            .route("/", get(admin::home))
            .route("/api/{list}", get(admin::list))
            .route_layer(from_fn_with_state(self.clone(), admin::admin_guard))
            .layer(from_fn_with_state(handle, admin::engine_session));
        if frame_guard {
            router = router.layer(map_response(admin::frame_guard));
        }
        Ok(router.with_state(self.clone()))
    }

    /// Install the domain whitelist ahead of the engine's routes.
    pub fn pre_routes(&self, policy: AccessPolicy) -> AppResult<()> {
        self.policy.install(CrossOriginPolicy::Whitelist(policy))
    }

    pub fn allow_any_origin(&self) -> AppResult<()> {
        self.policy.install(CrossOriginPolicy::Permissive)
    }

    pub fn cross_origin_policy(&self) -> Option<CrossOriginPolicy> { self.policy.current() }

    /// Cover `router` with whichever cross-origin policy ends up installed.
    pub fn wrap_with_policy(&self, router: Router) -> Router {
        router.layer(from_fn_with_state(self.policy.clone(), enforce_cross_origin))
    }

    pub async fn open_database_connection(&self, timeout: Duration) -> AppResult<()> {
        let address = self.options.read().data_store.clone();
        let conn = datastore::open(&address, timeout).await?;
        info!(target: "engine", peer = %conn.peer, "engine connected to the data store");
        *self.connection.lock() = Some(conn);
        Ok(())
    }

    pub fn is_connected(&self) -> bool { self.connection.lock().is_some() }

    fn lookup_admin(&self, email: &str) -> AppResult<Option<AdminRecord>> {
        let user_model = self.options.read().user_model.clone();
        let model = self
            .models
            .get(&user_model)
            .ok_or_else(|| AppError::data_store("user_model_missing", format!("no '{}' list is registered", user_model)))?;
        let hit = model.records.iter().find(|r| {
            r.get("email").and_then(Value::as_str).map(|e| e.eq_ignore_ascii_case(email)).unwrap_or(false)
        });
        Ok(hit.map(admin_from_record))
    }
}

fn admin_from_record(record: &Value) -> AdminRecord {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).unwrap_or_default().to_string();
    let name = record.get("name");
    let (first_name, last_name) = match name {
        Some(Value::String(full)) => (full.clone(), String::new()),
        Some(n) => (text(n.get("first")), text(n.get("last"))),
        None => {
            warn!(target: "engine", "administrator record without a name");
            (String::new(), String::new())
        }
    };
    AdminRecord { first_name, last_name, email: text(record.get("email")) }
}

impl AdminDirectory for Engine {
    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, AppResult<Option<AdminRecord>>> {
        let found = self.lookup_admin(email);
        async move { found }.boxed()
    }
}
