use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::auth::guard_request;
use crate::error::{AppError, AppResult};
use crate::identity::AuthorizedPrincipal;
use crate::session::{session_middleware, Session, SessionHandle};

use super::Engine;

const ADMIN_CSS: &str = "body{font-family:system-ui,sans-serif;margin:0}\
header{background:#1c2a39;color:#fff;padding:.75rem 1rem}\
nav a{color:#cfd8e3;margin-right:1rem;text-decoration:none}\
main{padding:1rem}\n";

const ADMIN_JS: &str = "(function(){\
fetch(document.baseURI.replace(/\\/?$/,'/')).then(function(r){return r.json()})\
.then(function(home){document.title=home.brand;});\
})();\n";

pub(super) async fn static_asset(Path(path): Path<String>) -> AppResult<Response> {
    let (body, mime) = match path.as_str() {
        "admin.css" => (ADMIN_CSS, "text/css; charset=utf-8"),
        "admin.js" => (ADMIN_JS, "application/javascript; charset=utf-8"),
        _ => return Err(AppError::not_found("asset_not_found", format!("no admin asset '{}'", path))),
    };
    Ok(([(header::CONTENT_TYPE, HeaderValue::from_static(mime))], body).into_response())
}

pub(super) async fn home(
    State(engine): State<Arc<Engine>>,
    Extension(principal): Extension<AuthorizedPrincipal>,
) -> Json<Value> {
    let opts = engine.options();
    let lists: Vec<Value> = engine
        .models()
        .names()
        .into_iter()
        .filter_map(|name| engine.models().get(&name))
        .map(|m| json!({"name": m.name, "path": m.path(), "count": m.records.len()}))
        .collect();
    Json(json!({
        "brand": opts.brand,
        "user": principal.display_name,
        "locals": opts.locals,
        "nav": opts.nav,
        "lists": lists,
        "wysiwyg": {"additionalButtons": opts.wysiwyg_additional_buttons},
    }))
}

pub(super) async fn list(State(engine): State<Arc<Engine>>, Path(list): Path<String>) -> AppResult<Json<Value>> {
    let model = engine
        .models()
        .by_path(&list)
        .or_else(|| engine.models().get(&list))
        .ok_or_else(|| AppError::not_found("list_not_found", format!("no list '{}'", list)))?;
    let prefix = engine.options().model_prefix;
    Ok(Json(json!({
        "name": model.name,
        "collection": model.collection(prefix.as_deref()),
        "fields": model.fields,
        "items": model.records,
    })))
}

/// Run the engine's predicate in front of the admin routes.
pub(super) async fn admin_guard(State(engine): State<Arc<Engine>>, req: Request, next: Next) -> Response {
    let directory: &Engine = &engine;
    guard_request(engine.authorizer(), directory, req, next).await
}

/// The engine's own session wiring: reuse the request's session when the host
/// already attached one, otherwise load it from the shared handle.
pub(super) async fn engine_session(State(handle): State<SessionHandle>, req: Request, next: Next) -> AppResult<Response> {
    if req.extensions().get::<Session>().is_some() {
        return Ok(next.run(req).await);
    }
    session_middleware(State(handle), req, next).await
}

pub(super) async fn frame_guard(mut resp: Response) -> Response {
    resp.headers_mut().insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    resp
}
