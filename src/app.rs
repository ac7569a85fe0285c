//! The host's request-handling app.
//!
//! Mounts are recorded in registration order and assembled into an axum
//! `Router` only at the end. A middleware wraps exactly the routes registered
//! after it, and earlier middleware runs first, so the order in which the boot
//! registers things is the order requests see them.

use axum::routing::MethodRouter;
use axum::Router;

type LayerFn = Box<dyn FnOnce(Router) -> Router + Send>;

enum PendingMount {
    Layer(LayerFn),
    Routes(Router),
    Nest { prefix: String, router: Router },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Middleware,
    Route,
    Router,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    pub kind: MountKind,
    pub label: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppSettings {
    pub view_cache: bool,
    pub trust_proxy: bool,
    pub body_limit: Option<usize>,
}

#[derive(Default)]
pub struct HostApp {
    mounts: Vec<PendingMount>,
    log: Vec<MountRecord>,
    settings: AppSettings,
}

impl HostApp {
    pub fn new() -> Self { Self::default() }

    pub fn use_middleware<F>(&mut self, label: &str, apply: F)
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.mounts.push(PendingMount::Layer(Box::new(apply)));
        self.record(MountKind::Middleware, label, None);
    }

    pub fn route(&mut self, label: &str, path: &str, handler: MethodRouter) {
        self.mounts.push(PendingMount::Routes(Router::new().route(path, handler)));
        self.record(MountKind::Route, label, Some(path));
    }

    /// Mount a router at the root.
    pub fn merge(&mut self, label: &str, router: Router) {
        self.mounts.push(PendingMount::Routes(router));
        self.record(MountKind::Router, label, None);
    }

    /// Mount a router under `prefix`. Consecutive mounts at one prefix share a
    /// single nest so their routes resolve side by side.
    pub fn nest(&mut self, label: &str, prefix: &str, router: Router) {
        match self.mounts.last_mut() {
            Some(PendingMount::Nest { prefix: last, router: existing }) if last == prefix => {
                let merged = std::mem::take(existing).merge(router);
                *existing = merged;
            }
            _ => self.mounts.push(PendingMount::Nest { prefix: prefix.to_string(), router }),
        }
        self.record(MountKind::Router, label, Some(prefix));
    }

    pub fn enable_view_cache(&mut self) { self.settings.view_cache = true; }

    pub fn set_trust_proxy(&mut self, on: bool) { self.settings.trust_proxy = on; }

    pub fn set_body_limit(&mut self, bytes: usize) { self.settings.body_limit = Some(bytes); }

    pub fn settings(&self) -> &AppSettings { &self.settings }

    pub fn mount_log(&self) -> &[MountRecord] { &self.log }

    /// Registration index of the first mount with this label.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.log.iter().position(|m| m.label == label)
    }

    /// Assemble the router. Walking the mounts backwards lets each layer wrap
    /// precisely what was registered after it.
    pub fn into_router(self) -> Router {
        let mut router = Router::new();
        for mount in self.mounts.into_iter().rev() {
            router = match mount {
                PendingMount::Layer(apply) => apply(router),
                PendingMount::Routes(r) => router.merge(r),
                PendingMount::Nest { prefix, router: r } => router.nest(&prefix, r),
            };
        }
        router
    }

    fn record(&mut self, kind: MountKind, label: &str, path: Option<&str>) {
        tracing::debug!(target: "boot", ?kind, label, path, "mounted");
        self.log.push(MountRecord { kind, label: label.to_string(), path: path.map(str::to_string) });
    }
}
