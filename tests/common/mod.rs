#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};

use siteboot::identity::{HandshakeOutcome, IdentityAssertion, IdentityProvider, ProviderError};
use siteboot::settings::ProcessEnv;

pub const FAKE_AUTHORIZE: &str = "https://idp.test/authorize";

#[derive(Debug, Clone)]
pub enum FakeAnswer {
    User(IdentityAssertion),
    NoUser,
    Reject(String),
}

/// Identity provider that answers from memory and counts round trips.
pub struct FakeProvider {
    answer: FakeAnswer,
    pub authorizations: AtomicUsize,
    pub exchanges: AtomicUsize,
}

impl FakeProvider {
    pub fn new(answer: FakeAnswer) -> Arc<Self> {
        Arc::new(Self { answer, authorizations: AtomicUsize::new(0), exchanges: AtomicUsize::new(0) })
    }

    pub fn user(emails: &[&str]) -> Arc<Self> {
        Self::new(FakeAnswer::User(IdentityAssertion::new("auth0|1", "Test User", emails)))
    }

    pub fn round_trips(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst) + self.exchanges.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> String {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        format!("{}?state={}", FAKE_AUTHORIZE, state)
    }

    fn exchange<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<HandshakeOutcome, ProviderError>> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let out = match (&self.answer, code) {
            (_, "bad") => Err(ProviderError::Provider { error: "invalid_grant".into(), description: "bad code".into() }),
            (FakeAnswer::User(u), _) => Ok(HandshakeOutcome::Authenticated(u.clone())),
            (FakeAnswer::NoUser, _) => Ok(HandshakeOutcome::NoUser),
            (FakeAnswer::Reject(e), _) => Err(ProviderError::Malformed(e.clone())),
        };
        async move { out }.boxed()
    }
}

/// Loopback listener standing in for the data store. Connections are held open.
pub async fn data_store() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });
    format!("mongodb://{}/sitedb", addr)
}

/// An address nothing listens on.
pub async fn closed_data_store() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("mongodb://{}/sitedb", addr)
}

pub const ADMIN_EMAIL: &str = "admin@example.org";
pub const DEV_EMAIL: &str = "dev@example.org";

/// A module root with `config.json`, a `User` list holding two administrators,
/// a `Post` list and a public index page.
pub fn site_dir(config: Value) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.json"), config.to_string()).unwrap();
    let models = dir.path().join("models");
    std::fs::create_dir_all(&models).unwrap();
    let users = json!({
        "name": "User",
        "fields": {"name": "Name", "email": "Email"},
        "records": [
            {"name": {"first": "Site", "last": "Admin"}, "email": ADMIN_EMAIL},
            {"name": {"first": "Dev", "last": "User"}, "email": DEV_EMAIL}
        ]
    });
    std::fs::write(models.join("User.json"), users.to_string()).unwrap();
    let posts = json!({"name": "Post", "fields": {"title": "Text"}, "records": [{"title": "Hello"}]});
    std::fs::write(models.join("Post.json"), posts.to_string()).unwrap();
    let public = dir.path().join("public");
    std::fs::create_dir_all(&public).unwrap();
    std::fs::write(public.join("index.html"), "<h1>Site</h1>").unwrap();
    dir
}

pub fn env_of(pairs: &[(&str, &str)]) -> ProcessEnv {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    ProcessEnv::from_lookup(|name| map.get(name).cloned())
}

pub fn production_env() -> ProcessEnv {
    env_of(&[
        ("SITE_ENV", "production"),
        ("COOKIE_SECRET", "test-secret"),
        ("AUTH0_DOMAIN", "idp.test"),
        ("AUTH0_CLIENT_ID", "client"),
        ("AUTH0_CLIENT_SECRET", "shh"),
    ])
}

pub fn development_env() -> ProcessEnv {
    env_of(&[("SITE_ENV", "development"), ("DEV_EMAIL", DEV_EMAIL)])
}

pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await });
    format!("http://{}", addr)
}

/// Browser-like client that keeps cookies but does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub fn location(resp: &reqwest::Response) -> String {
    assert!(resp.status().is_redirection(), "expected a redirect, got {}", resp.status());
    resp.headers()["location"].to_str().unwrap().to_string()
}

pub fn state_param(authorize_url: &str) -> String {
    let url = url::Url::parse(authorize_url).unwrap();
    url.query_pairs().find(|(k, _)| k == "state").map(|(_, v)| v.to_string()).unwrap()
}
