//! Boot orchestration.
//!
//! [`start`] takes a site configuration, the host's [`HostApp`] and the module
//! root, and wires session, identity, login gate, engine, admin routers,
//! domain routes and access policy onto the app in a fixed order. The order is
//! load-bearing: cookie and session middleware precede the identity layer,
//! the engine gets its predicate before any admin router exists, and the
//! engine's session is bound before the admin routers are built.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tracing::info;

use crate::access::{AccessPolicy, CrossOriginPolicy};
use crate::app::{AppSettings, HostApp, MountRecord};
use crate::auth::{AdminAuthorizer, AuthGate, PostLoginTarget, CALLBACK_PATH, LOGIN_PATH};
use crate::config::{load_site_config, SiteConfiguration};
use crate::datastore::DataStoreAddress;
use crate::engine::{CloudinaryOptions, Engine, EngineOptions, EngineSettings, Locals};
use crate::environment::Environment;
use crate::error::AppResult;
use crate::identity::{identity_session, IdentityProvider, IdentityStrategy, OAuthProvider};
use crate::routes::{DomainRoutes, SiteContext, StaticSiteRoutes};
use crate::session::{cookie_parser, session_middleware, SessionHandle, SessionOptions, SessionStoreFactory, StoreBackend};
use crate::settings::ProcessEnv;

pub const DEFAULT_ADMIN_PATH: &str = "cms";
pub const RICH_TEXT_EXTRA_BUTTONS: &str = "blockquote";
pub const DATA_STORE_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// Request bodies above this are refused by the body parsers.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    /// Already parsed by the host.
    Loaded(SiteConfiguration),
}

impl From<PathBuf> for ConfigSource {
    fn from(p: PathBuf) -> Self { ConfigSource::File(p) }
}

impl From<&str> for ConfigSource {
    fn from(p: &str) -> Self { ConfigSource::File(PathBuf::from(p)) }
}

impl From<SiteConfiguration> for ConfigSource {
    fn from(c: SiteConfiguration) -> Self { ConfigSource::Loaded(c) }
}

/// Everything the host hands to [`start`].
pub struct BootRequest {
    pub config_source: ConfigSource,
    pub app: HostApp,
    pub module_root: PathBuf,
    pub engine_settings: EngineSettings,
    /// Caller-supplied data-store address; the environment override still wins.
    pub data_store_override: Option<String>,
    pub env: ProcessEnv,
    pub routes: Arc<dyn DomainRoutes>,
    /// Replaces the provider built from the environment credentials.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,
    pub post_login: PostLoginTarget,
    pub data_store_timeout: Duration,
}

impl BootRequest {
    pub fn new(config_source: impl Into<ConfigSource>, module_root: impl Into<PathBuf>) -> Self {
        Self {
            config_source: config_source.into(),
            app: HostApp::new(),
            module_root: module_root.into(),
            engine_settings: EngineSettings::default(),
            data_store_override: None,
            env: ProcessEnv::from_env(),
            routes: Arc::new(StaticSiteRoutes),
            identity_provider: None,
            post_login: PostLoginTarget::default(),
            data_store_timeout: DATA_STORE_OPEN_TIMEOUT,
        }
    }

    pub fn with_app(mut self, app: HostApp) -> Self {
        self.app = app;
        self
    }

    pub fn with_env(mut self, env: ProcessEnv) -> Self {
        self.env = env;
        self
    }

    pub fn with_engine_settings(mut self, settings: EngineSettings) -> Self {
        self.engine_settings = settings;
        self
    }

    pub fn with_data_store(mut self, uri: impl Into<String>) -> Self {
        self.data_store_override = Some(uri.into());
        self
    }

    pub fn with_routes(mut self, routes: Arc<dyn DomainRoutes>) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    pub fn with_post_login(mut self, target: PostLoginTarget) -> Self {
        self.post_login = target;
        self
    }

    pub fn with_data_store_timeout(mut self, timeout: Duration) -> Self {
        self.data_store_timeout = timeout;
        self
    }
}

/// A completed boot.
#[derive(Debug)]
pub struct BootedSite {
    pub config: SiteConfiguration,
    pub environment: Environment,
    pub engine: Arc<Engine>,
    pub sessions: SessionHandle,
    pub address: DataStoreAddress,
    pub admin_path: String,
    pub mount_log: Vec<MountRecord>,
    pub app_settings: AppSettings,
    router: Router,
}

impl BootedSite {
    pub fn router(&self) -> Router { self.router.clone() }

    pub fn into_router(self) -> Router { self.router }

    pub fn cross_origin_policy(&self) -> Option<CrossOriginPolicy> { self.engine.cross_origin_policy() }

    /// Registration index of a labelled mount.
    pub fn mount_position(&self, label: &str) -> Option<usize> {
        self.mount_log.iter().position(|m| m.label == label)
    }
}

/// Admin path: fixed in development, else the configured one, else the default.
pub fn resolve_admin_path(environment: Environment, config: &SiteConfiguration) -> String {
    if environment.is_development() {
        return DEFAULT_ADMIN_PATH.to_string();
    }
    config
        .admin_path
        .as_deref()
        .map(|p| p.trim().trim_matches('/'))
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_ADMIN_PATH)
        .to_string()
}

/// Boot the site. `on_ready` runs once, after the data-store connection is
/// open; any error before that is returned and nothing is served.
pub async fn start<F>(request: BootRequest, on_ready: F) -> AppResult<BootedSite>
where
    F: FnOnce(&BootedSite),
{
    let BootRequest {
        config_source,
        mut app,
        module_root,
        engine_settings,
        data_store_override,
        env,
        routes,
        identity_provider,
        post_login,
        data_store_timeout,
    } = request;

    // 1. configuration
    let config = match config_source {
        ConfigSource::File(path) => load_site_config(&path).await?,
        ConfigSource::Loaded(config) => config,
    };
    env.validate()?;
    let environment = env.environment;
    let brand = environment.annotate_brand(&config.name);
    info!(target: "boot", "Initializing '{}' backend server ({})", brand, environment);

    // 2. data-store address
    let address = DataStoreAddress::resolve(env.data_store_override.as_ref(), data_store_override.as_deref(), &config.database);
    info!(target: "boot", "Using database string defined from {}", address.source());

    // 3. session handle
    let session_options = SessionOptions {
        trust_proxy: true,
        backend: StoreBackend::for_environment(environment),
        ..SessionOptions::default()
    };
    let sessions = SessionStoreFactory::build(&address, env.session_secret()?, session_options);

    // 4. parsers and app settings
    app.use_middleware("cookie-parser", |r| r.layer(from_fn(cookie_parser)));
    app.use_middleware("body-parser", |r| r.layer(DefaultBodyLimit::max(BODY_LIMIT)));
    app.set_body_limit(BODY_LIMIT);
    app.enable_view_cache();
    app.set_trust_proxy(true);

    // 5. session middleware
    let request_sessions = sessions.clone();
    app.use_middleware("session", move |r| r.layer(from_fn_with_state(request_sessions, session_middleware)));

    // 6. identity strategy
    let provider = match (identity_provider, env.identity_settings()) {
        (Some(p), _) => Some(p),
        (None, Some(settings)) if !environment.is_development() => {
            Some(Arc::new(OAuthProvider::new(settings)?) as Arc<dyn IdentityProvider>)
        }
        (None, _) => None,
    };
    let strategy = IdentityStrategy::new(provider);
    let layer_strategy = strategy.clone();
    app.use_middleware("identity-session", move |r| r.layer(from_fn_with_state(layer_strategy, identity_session)));

    // 7. engine, carrying the authorization predicate
    let authorizer = AdminAuthorizer::for_environment(environment, env.dev_email.as_deref())?;
    let mut options = EngineOptions::new(brand.clone(), module_root.clone(), address.clone());
    options.model_prefix = config.db_prefix.clone();
    options.frame_guard = false;
    options.auto_update = true;
    options.session = true;
    options.user_model = "User".to_string();
    options.locals = Locals::for_environment(environment);
    options.cloudinary = CloudinaryOptions { prefix: Some(config.database.clone()), folders: true, secure: true };
    let engine = Engine::init(options, authorizer);

    // 8. login gate, ahead of the admin mount
    let admin_path = resolve_admin_path(environment, &config);
    let gate = AuthGate::new(environment, strategy, admin_path.clone()).with_post_login(post_login);
    if environment.is_development() {
        app.route("dev-login-shortcut", LOGIN_PATH, AuthGate::dev_shortcut());
    } else {
        app.route("auth-login", LOGIN_PATH, gate.login_route());
    }
    app.route("auth-callback", CALLBACK_PATH, gate.callback_route());

    // 9-11. models, caller settings, engine session
    engine.import_models().await?;
    engine.apply_settings(&engine_settings)?;
    engine.init_session(sessions.clone())?;

    // 12. compression and admin routers
    let admin_prefix = format!("/{}", admin_path);
    app.use_middleware("compression", |r| r.layer(CompressionLayer::new()));
    app.nest("admin-static", &admin_prefix, engine.wrap_with_policy(engine.static_router()));
    app.nest("admin-dynamic", &admin_prefix, engine.wrap_with_policy(engine.dynamic_router()?));

    // 13. second import and editor toolbar
    engine.import_models().await?;
    engine.set("wysiwyg additional buttons", json!(RICH_TEXT_EXTRA_BUTTONS))?;

    // 14. domain routes
    let ctx = SiteContext {
        module_root,
        environment,
        engine: engine.clone(),
        view_cache: app.settings().view_cache,
    };
    let site_routes = routes.routes(&ctx)?;
    engine.set("routes", json!(routes.name()))?;
    app.merge("routes", engine.wrap_with_policy(site_routes));
    engine.set("admin path", json!(admin_path))?;
    if let Some(nav) = &config.admin_nav {
        engine.set("nav", nav.0.clone())?;
    }

    // 15. access policy: whitelist or permissive, never both
    match config.whitelist().map(AccessPolicy::new).transpose()?.flatten() {
        Some(policy) => engine.pre_routes(policy)?,
        None => engine.allow_any_origin()?,
    }

    // 16. data store, then ready
    engine.open_database_connection(data_store_timeout).await?;
    let site = BootedSite {
        mount_log: app.mount_log().to_vec(),
        app_settings: app.settings().clone(),
        router: app.into_router(),
        config,
        environment,
        engine,
        sessions,
        address,
        admin_path,
    };
    on_ready(&site);
    info!(target: "boot", "Backend server initialized successfully!");
    info!(target: "boot", "> CMS path is at /{}", site.admin_path);
    info!(target: "boot", "> Using database '{}'", site.config.database);
    Ok(site)
}
