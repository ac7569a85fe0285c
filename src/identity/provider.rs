use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::settings::IdentityProviderSettings;
use crate::tprintln;

use super::assertion::IdentityAssertion;

/// Scope requested at login.
pub const LOGIN_SCOPE: &str = "openid email profile";

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider returned {error}: {description}")]
    Provider { error: String, description: String },
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed identity provider response: {0}")]
    Malformed(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        let code = match &err {
            ProviderError::Provider { .. } => "provider_error",
            ProviderError::Transport(_) => "provider_unreachable",
            ProviderError::Malformed(_) => "provider_malformed",
        };
        AppError::identity(code, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Authenticated(IdentityAssertion),
    /// The provider answered but produced no usable user.
    NoUser,
}

/// Identity-provider strategy used by the login gate.
pub trait IdentityProvider: Send + Sync {
    /// Where to send the caller to start the handshake.
    fn authorization_url(&self, state: &str) -> String;

    /// Trade an authorization code for an identity.
    fn exchange<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<HandshakeOutcome, ProviderError>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Authorization-code flow against an Auth0-style tenant
/// (`/authorize`, `/oauth/token`, `/userinfo`).
pub struct OAuthProvider {
    settings: IdentityProviderSettings,
    base: String,
    http: reqwest::Client,
}

impl OAuthProvider {
    pub fn new(settings: IdentityProviderSettings) -> AppResult<Self> {
        let domain = settings.domain.trim_end_matches('/');
        let base = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        };
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| AppError::internal("http_client", e.to_string()))?;
        Ok(Self { settings, base, http })
    }

    pub fn settings(&self) -> &IdentityProviderSettings { &self.settings }

    async fn access_token(&self, code: &str) -> Result<String, ProviderError> {
        let body = json!({
            "grant_type": "authorization_code",
            "client_id": self.settings.client_id,
            "client_secret": self.settings.client_secret,
            "code": code,
            "redirect_uri": self.settings.callback_url,
        });
        let resp = self.http.post(format!("{}/oauth/token", self.base)).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(match resp.json::<ErrorBody>().await {
                Ok(b) => ProviderError::Provider { error: b.error, description: b.error_description },
                Err(_) => ProviderError::Malformed(format!("token endpoint answered {}", status)),
            });
        }
        let token: TokenResponse = resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn userinfo(&self, token: &str) -> Result<serde_json::Value, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/userinfo", self.base))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;
        resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

impl IdentityProvider for OAuthProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}/authorize?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.base,
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.callback_url),
            urlencoding::encode(LOGIN_SCOPE),
            urlencoding::encode(state),
        )
    }

    fn exchange<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<HandshakeOutcome, ProviderError>> {
        async move {
            let token = self.access_token(code).await?;
            let info = self.userinfo(&token).await?;
            tprintln!("identity.exchange sub={:?}", info.get("sub"));
            Ok(match IdentityAssertion::from_userinfo(&info) {
                Some(a) => HandshakeOutcome::Authenticated(a),
                None => HandshakeOutcome::NoUser,
            })
        }
        .boxed()
    }
}
