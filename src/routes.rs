//! Domain route modules mounted after the admin surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use tracing::debug;

use crate::engine::Engine;
use crate::environment::Environment;
use crate::error::{AppError, AppResult};

/// What a route module gets to see while building its router.
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub module_root: PathBuf,
    pub environment: Environment,
    pub engine: Arc<Engine>,
    pub view_cache: bool,
}

pub trait DomainRoutes: Send + Sync {
    fn name(&self) -> &str;
    fn routes(&self, ctx: &SiteContext) -> AppResult<Router>;
}

/// Serves `<module root>/public` as the public site.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSiteRoutes;

impl DomainRoutes for StaticSiteRoutes {
    fn name(&self) -> &str { "static-site" }

    fn routes(&self, ctx: &SiteContext) -> AppResult<Router> {
        let root = ctx.module_root.join("public");
        if !root.is_dir() {
            return Err(AppError::config_read("routes_missing", format!("no public directory at {}", root.display())));
        }
        let site = PublicDir { root, cache: ctx.view_cache.then(Default::default) };
        Ok(Router::new().route("/", get(serve_public)).fallback(serve_public).with_state(site))
    }
}

type PageCache = Arc<RwLock<HashMap<PathBuf, Arc<Vec<u8>>>>>;

#[derive(Clone)]
struct PublicDir {
    root: PathBuf,
    cache: Option<PageCache>,
}

/// Map a request path to a file under `root`; `None` for anything that
/// would climb out of it.
fn resolve_public(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(uri_path).ok()?;
    let mut out = root.to_path_buf();
    for seg in decoded.split('/') {
        match seg {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') || s.contains('\0') => return None,
            s => out.push(s),
        }
    }
    if decoded.ends_with('/') || out == root {
        out.push("index.html");
    }
    Some(out)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn serve_public(State(site): State<PublicDir>, uri: Uri) -> AppResult<Response> {
    let not_found = || AppError::not_found("page_not_found", format!("no page at {}", uri.path()));
    let path = resolve_public(&site.root, uri.path()).ok_or_else(not_found)?;

    let cached = site.cache.as_ref().and_then(|c| c.read().get(&path).cloned());
    let body = match cached {
        Some(b) => b,
        None => {
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => Arc::new(b),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
                Err(e) => return Err(AppError::internal("page_read", format!("{}: {}", path.display(), e))),
            };
            if let Some(cache) = &site.cache {
                debug!(target: "engine", path = %path.display(), "caching page");
                cache.write().insert(path.clone(), bytes.clone());
            }
            bytes
        }
    };
    let mime = HeaderValue::from_static(content_type(&path));
    Ok(([(header::CONTENT_TYPE, mime)], body.as_ref().clone()).into_response())
}
