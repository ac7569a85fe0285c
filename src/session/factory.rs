use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use axum::response::Response;
use base64::Engine;
use tracing::{debug, info};

use crate::datastore::DataStoreAddress;
use crate::environment::Environment;
use crate::error::{AppError, AppResult};

use super::cookie::{session_cookie, sign_session_id, unsign_session_id, CookieJar};
use super::middleware::Session;
use super::store::{DataStoreSessionStore, MemoryStore, SessionStore};

pub const SESSION_COOKIE: &str = "site.sid";

/// Two weeks, matching the store's default expiry.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    DataStore,
}

impl StoreBackend {
    pub fn for_environment(env: Environment) -> Self {
        if env.is_development() { StoreBackend::Memory } else { StoreBackend::DataStore }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub cookie_name: String,
    pub ttl: Duration,
    /// Save existing sessions on every request, modified or not.
    pub resave: bool,
    /// Persist brand-new sessions that were never written to.
    pub save_uninitialized: bool,
    /// Mark the cookie Secure when a trusted proxy reports https.
    pub trust_proxy: bool,
    pub backend: StoreBackend,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cookie_name: SESSION_COOKIE.to_string(),
            ttl: DEFAULT_SESSION_TTL,
            resave: true,
            save_uninitialized: false,
            trust_proxy: false,
            backend: StoreBackend::DataStore,
        }
    }
}

struct HandleInner {
    secret: String,
    store: Arc<dyn SessionStore>,
    options: SessionOptions,
}

/// The one session handle of a boot. Cloning shares the same store; the
/// session middleware and the engine must hold clones of the same handle.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl Debug for SessionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("store", &self.inner.store.name())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn with_store(secret: impl Into<String>, store: Arc<dyn SessionStore>, options: SessionOptions) -> Self {
        Self { inner: Arc::new(HandleInner { secret: secret.into(), store, options }) }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> { &self.inner.store }

    pub fn options(&self) -> &SessionOptions { &self.inner.options }

    pub fn cookie_name(&self) -> &str { &self.inner.options.cookie_name }

    /// True when both handles are clones of one construction.
    pub fn same_as(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn new_session_id() -> AppResult<String> {
        // 256-bit random id, base64url without padding
        let mut buf = [0u8; 32];
        getrandom::getrandom(&mut buf).map_err(|e| AppError::internal("session_id_entropy", e.to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
    }

    /// Session id from a verified cookie, if any.
    pub fn session_id_from(&self, jar: &CookieJar) -> Option<String> {
        let raw = jar.get(self.cookie_name())?;
        unsign_session_id(raw, &self.inner.secret)
    }

    /// Persist the session after the handler ran and set the cookie for a new id.
    pub(crate) async fn commit(&self, session: &Session, request_headers: &HeaderMap, resp: &mut Response) -> AppResult<()> {
        let snap = session.snapshot();
        let opts = &self.inner.options;
        if let Some(old) = snap.replaced.as_deref() {
            self.inner.store.destroy(old).await?;
            debug!(target: "session", "session id regenerated");
        }
        let should_save = if snap.is_new {
            (snap.modified && !snap.data.is_empty()) || opts.save_uninitialized
        } else {
            opts.resave || snap.modified
        };
        if !should_save {
            return Ok(());
        }
        self.inner.store.save(&snap.id, snap.data, opts.ttl).await?;
        if snap.is_new {
            let secure = opts.trust_proxy && forwarded_https(request_headers);
            let signed = sign_session_id(&snap.id, &self.inner.secret);
            let cookie = session_cookie(self.cookie_name(), &signed, opts.ttl.as_secs(), secure)?;
            resp.headers_mut().append(header::SET_COOKIE, cookie);
        }
        Ok(())
    }
}

fn forwarded_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or_default().trim().eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Builds the boot's [`SessionHandle`].
pub struct SessionStoreFactory;

impl SessionStoreFactory {
    /// Never blocks: a data-store backend connects in the background.
    pub fn build(address: &DataStoreAddress, secret: impl Into<String>, options: SessionOptions) -> SessionHandle {
        let store: Arc<dyn SessionStore> = match options.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::default()),
            StoreBackend::DataStore => Arc::new(DataStoreSessionStore::connect(address.clone())),
        };
        info!(target: "session", backend = store.name(), address = %address, "session store constructed");
        SessionHandle::with_store(secret, store, options)
    }
}
