use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::datastore::{self, DataStoreAddress};
use crate::error::{AppError, AppResult};

/// How long the background probe waits for the session backend.
pub const BACKEND_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes between two sweeps of expired entries.
pub const PRUNE_EVERY: usize = 256;

/// Identity slot written by the identity strategy. The user value is stored
/// exactly as the strategy serialized it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassportState {
    pub user: serde_json::Value,
}

/// Persisted per-session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passport: Option<PassportState>,
    #[serde(default, rename = "returnTo", skip_serializing_if = "Option::is_none")]
    pub return_to: Option<String>,
    #[serde(default, rename = "oauthState", skip_serializing_if = "Option::is_none")]
    pub oauth_state: Option<String>,
}

impl SessionData {
    pub fn is_empty(&self) -> bool {
        self.passport.is_none() && self.return_to.is_none() && self.oauth_state.is_none()
    }
}

pub type StoreFuture<'a, T> = BoxFuture<'a, AppResult<T>>;

/// Session persistence backend shared by the session middleware and the engine.
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &'static str;
    fn load<'a>(&'a self, sid: &'a str) -> StoreFuture<'a, Option<SessionData>>;
    fn save<'a>(&'a self, sid: &'a str, data: SessionData, ttl: Duration) -> StoreFuture<'a, ()>;
    fn destroy<'a>(&'a self, sid: &'a str) -> StoreFuture<'a, ()>;
}

#[derive(Debug)]
struct Entry {
    data: SessionData,
    expires_at: Instant,
}

/// In-process store. Expired entries are dropped on read and swept every
/// [`PRUNE_EVERY`] writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn get(&self, sid: &str) -> Option<SessionData> {
        let now = Instant::now();
        let mut expired = false;
        let out = {
            let map = self.entries.read();
            match map.get(sid) {
                Some(e) if e.expires_at > now => Some(e.data.clone()),
                Some(_) => {
                    expired = true;
                    None
                }
                None => None,
            }
        };
        if expired {
            self.entries.write().remove(sid);
        }
        out
    }

    pub fn put(&self, sid: &str, data: SessionData, ttl: Duration) {
        let entry = Entry { data, expires_at: Instant::now() + ttl };
        self.entries.write().insert(sid.to_string(), entry);
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_EVERY == 0 {
            self.purge_expired();
        }
    }

    /// Drop every expired entry; returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        let removed = before - map.len();
        if removed > 0 {
            debug!(target: "session", removed, "expired sessions swept");
        }
        removed
    }

    pub fn remove(&self, sid: &str) -> bool {
        self.entries.write().remove(sid).is_some()
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

impl SessionStore for MemoryStore {
    fn name(&self) -> &'static str { "memory" }

    fn load<'a>(&'a self, sid: &'a str) -> StoreFuture<'a, Option<SessionData>> {
        future::ready(Ok(self.get(sid))).boxed()
    }

    fn save<'a>(&'a self, sid: &'a str, data: SessionData, ttl: Duration) -> StoreFuture<'a, ()> {
        self.put(sid, data, ttl);
        future::ready(Ok(())).boxed()
    }

    fn destroy<'a>(&'a self, sid: &'a str) -> StoreFuture<'a, ()> {
        self.remove(sid);
        future::ready(Ok(())).boxed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreHealth {
    Connecting,
    Connected,
    Unreachable(String),
}

/// Store bound to the data-store address. Construction never blocks: the
/// backend connection is established in the background and a failure only
/// shows up when the store is next used.
pub struct DataStoreSessionStore {
    address: DataStoreAddress,
    cache: MemoryStore,
    health: Arc<RwLock<StoreHealth>>,
}

impl DataStoreSessionStore {
    pub fn connect(address: DataStoreAddress) -> Self {
        let health = Arc::new(RwLock::new(StoreHealth::Connecting));
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let probe_health = health.clone();
                let probe_addr = address.clone();
                rt.spawn(async move {
                    let next = match datastore::open(&probe_addr, BACKEND_CONNECT_TIMEOUT).await {
                        Ok(conn) => {
                            info!(target: "session", peer = %conn.peer, "session backend connected");
                            StoreHealth::Connected
                        }
                        Err(e) => {
                            warn!(target: "session", "session backend unreachable: {}", e);
                            StoreHealth::Unreachable(e.message().to_string())
                        }
                    };
                    *probe_health.write() = next;
                });
            }
            Err(_) => {
                *health.write() = StoreHealth::Unreachable("no async runtime to connect from".into());
            }
        }
        Self { address, cache: MemoryStore::default(), health }
    }

    pub fn address(&self) -> &DataStoreAddress { &self.address }

    pub fn health(&self) -> StoreHealth { self.health.read().clone() }

    fn ensure_usable(&self) -> AppResult<()> {
        match &*self.health.read() {
            StoreHealth::Unreachable(reason) => Err(AppError::session(
                "session_store_unreachable",
                format!("{}: {}", self.address, reason),
            )),
            _ => Ok(()),
        }
    }
}

impl SessionStore for DataStoreSessionStore {
    fn name(&self) -> &'static str { "datastore" }

    fn load<'a>(&'a self, sid: &'a str) -> StoreFuture<'a, Option<SessionData>> {
        future::ready(self.ensure_usable().map(|_| self.cache.get(sid))).boxed()
    }

    fn save<'a>(&'a self, sid: &'a str, data: SessionData, ttl: Duration) -> StoreFuture<'a, ()> {
        let res = self.ensure_usable().map(|_| self.cache.put(sid, data, ttl));
        future::ready(res).boxed()
    }

    fn destroy<'a>(&'a self, sid: &'a str) -> StoreFuture<'a, ()> {
        let res = self.ensure_usable().map(|_| {
            self.cache.remove(sid);
        });
        future::ready(res).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_return_to(path: &str) -> SessionData {
        SessionData { return_to: Some(path.to_string()), ..Default::default() }
    }

    #[tokio::test]
    async fn memory_store_expires_entries() {
        let store = MemoryStore::default();
        store.save("a", with_return_to("/cms"), Duration::from_secs(60)).await.unwrap();
        store.save("b", with_return_to("/x"), Duration::from_millis(0)).await.unwrap();
        assert_eq!(store.load("a").await.unwrap().unwrap().return_to.as_deref(), Some("/cms"));
        assert!(store.load("b").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
        store.destroy("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn expired_entries_are_swept_by_later_writes() {
        let store = MemoryStore::default();
        for i in 0..PRUNE_EVERY - 1 {
            store.put(&format!("anon-{}", i), with_return_to("/cms"), Duration::ZERO);
        }
        assert_eq!(store.len(), PRUNE_EVERY - 1);
        store.put("fresh", with_return_to("/cms"), Duration::from_secs(60));
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());

        store.put("gone", SessionData::default(), Duration::ZERO);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn session_data_serializes_with_camel_case_keys() {
        let v = serde_json::to_value(with_return_to("/cms")).unwrap();
        assert_eq!(v, serde_json::json!({"returnTo": "/cms"}));
        assert!(SessionData::default().is_empty());
    }

    async fn wait_for_probe(store: &DataStoreSessionStore) -> StoreHealth {
        for _ in 0..100 {
            let h = store.health();
            if h != StoreHealth::Connecting {
                return h;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        store.health()
    }

    #[tokio::test]
    async fn datastore_store_surfaces_unreachable_backend_on_use() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let addr = DataStoreAddress::resolve(None, Some(&format!("mongodb://127.0.0.1:{}/s", port)), "s");

        let store = DataStoreSessionStore::connect(addr);
        assert!(matches!(wait_for_probe(&store).await, StoreHealth::Unreachable(_)));
        let err = store.load("sid").await.unwrap_err();
        assert!(matches!(err, AppError::Session { .. }));
    }

    #[tokio::test]
    async fn datastore_store_works_once_connected() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let addr = DataStoreAddress::resolve(None, Some(&format!("mongodb://127.0.0.1:{}/s", port)), "s");

        let store = DataStoreSessionStore::connect(addr);
        assert_eq!(wait_for_probe(&store).await, StoreHealth::Connected);
        store.save("sid", with_return_to("/cms"), Duration::from_secs(5)).await.unwrap();
        assert!(store.load("sid").await.unwrap().is_some());
    }

    #[test]
    fn datastore_store_without_runtime_is_unreachable() {
        let addr = DataStoreAddress::resolve(None, None, "s");
        let store = DataStoreSessionStore::connect(addr);
        assert!(matches!(store.health(), StoreHealth::Unreachable(_)));
    }
}
