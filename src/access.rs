//! Embedding and cross-origin policy for the engine's surface.
//!
//! Exactly one [`CrossOriginPolicy`] is installed per boot: the domain
//! whitelist when the site lists allowed domains, otherwise the permissive
//! fallback. The policy lives in a [`SharedPolicy`] cell that the request
//! filter reads on every request, so routers mounted before the policy is
//! chosen are still covered by it.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::RwLock;
use tracing::info;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    domains: Vec<String>,
    frame_ancestors: HeaderValue,
}

impl AccessPolicy {
    /// `None` for an empty list; the caller falls back to the permissive policy.
    pub fn new(domains: &[String]) -> AppResult<Option<Self>> {
        let domains: Vec<String> = domains
            .iter()
            .map(|d| d.trim().trim_end_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .collect();
        if domains.is_empty() {
            return Ok(None);
        }
        let csp = format!("frame-ancestors {}", domains.join(" "));
        let frame_ancestors = HeaderValue::from_str(&csp)
            .map_err(|_| AppError::misconfigured("allowed_domains_invalid", format!("cannot send header: {}", csp)))?;
        info!(target: "boot", "Using URL whitelist: {}", domains.join(","));
        Ok(Some(Self { domains, frame_ancestors }))
    }

    pub fn domains(&self) -> &[String] { &self.domains }

    pub fn allows_origin(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(origin))
    }

    fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        headers.insert(header::CONTENT_SECURITY_POLICY, self.frame_ancestors.clone());
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
        if let Some(origin) = origin {
            if origin.to_str().map(|o| self.allows_origin(o)).unwrap_or(false) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossOriginPolicy {
    Whitelist(AccessPolicy),
    /// Any origin may read the engine's responses.
    Permissive,
}

impl CrossOriginPolicy {
    pub fn is_whitelist(&self) -> bool { matches!(self, CrossOriginPolicy::Whitelist(_)) }

    pub fn is_permissive(&self) -> bool { matches!(self, CrossOriginPolicy::Permissive) }
}

/// Holds the boot's single cross-origin policy. Installing twice is an error.
#[derive(Debug, Clone, Default)]
pub struct SharedPolicy(Arc<RwLock<Option<CrossOriginPolicy>>>);

impl SharedPolicy {
    pub fn install(&self, policy: CrossOriginPolicy) -> AppResult<()> {
        let mut slot = self.0.write();
        if let Some(existing) = slot.as_ref() {
            return Err(AppError::misconfigured(
                "cross_origin_conflict",
                format!("a cross-origin policy is already active ({:?})", existing),
            ));
        }
        *slot = Some(policy);
        Ok(())
    }

    pub fn current(&self) -> Option<CrossOriginPolicy> { self.0.read().clone() }
}

pub async fn enforce_cross_origin(State(shared): State<SharedPolicy>, req: Request, next: Next) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();
    let mut resp = next.run(req).await;
    match shared.current() {
        Some(CrossOriginPolicy::Whitelist(policy)) => policy.apply(origin.as_ref(), resp.headers_mut()),
        Some(CrossOriginPolicy::Permissive) => {
            resp.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
        None => {}
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;

    fn domains(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn empty_list_means_no_whitelist() {
        assert!(AccessPolicy::new(&[]).unwrap().is_none());
        assert!(AccessPolicy::new(&domains(&["  "])).unwrap().is_none());
    }

    #[test]
    fn origin_matching() {
        let p = AccessPolicy::new(&domains(&["https://a.example.org/", "https://b.example.org"])).unwrap().unwrap();
        assert_eq!(p.domains(), ["https://a.example.org", "https://b.example.org"]);
        assert!(p.allows_origin("https://A.example.org"));
        assert!(!p.allows_origin("https://c.example.org"));
        assert!(AccessPolicy::new(&domains(&["bad\ndomain"])).is_err());
    }

    #[test]
    fn only_one_policy_per_boot() {
        let shared = SharedPolicy::default();
        assert!(shared.current().is_none());
        shared.install(CrossOriginPolicy::Permissive).unwrap();
        let p = AccessPolicy::new(&domains(&["https://a.example.org"])).unwrap().unwrap();
        assert!(shared.install(CrossOriginPolicy::Whitelist(p)).is_err());
        assert!(shared.current().unwrap().is_permissive());
    }

    #[tokio::test]
    async fn policy_chosen_after_mount_still_applies() {
        let shared = SharedPolicy::default();
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(shared.clone(), enforce_cross_origin));
        let p = AccessPolicy::new(&domains(&["https://a.example.org"])).unwrap().unwrap();
        shared.install(CrossOriginPolicy::Whitelist(p)).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, router).await });
        let client = reqwest::Client::new();

        let ok = client.get(&base).header("origin", "https://a.example.org").send().await.unwrap();
        assert_eq!(ok.headers()["content-security-policy"], "frame-ancestors https://a.example.org");
        assert_eq!(ok.headers()["access-control-allow-origin"], "https://a.example.org");

        let other = client.get(&base).header("origin", "https://c.example.org").send().await.unwrap();
        assert!(other.headers().get("access-control-allow-origin").is_none());
        assert!(other.headers().get("content-security-policy").is_some());
    }
}
