//! Process-environment values, read once at boot.
//!
//! Everything the boot needs from the environment is captured into
//! [`ProcessEnv`] through an injectable lookup, so the rest of the crate never
//! reads `std::env` ad hoc.

use base64::Engine as _;

use crate::environment::Environment;
use crate::error::{AppError, AppResult};

pub const DEFAULT_CALLBACK_URL: &str = "http://localhost:3000/callback";

/// Data-store override variables, highest priority first.
const DATA_STORE_VARS: [&str; 2] = ["MONGO_URI", "MONGO_URI_CI"];

/// An environment-sourced value together with the variable it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverride {
    pub var: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderSettings {
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessEnv {
    pub environment: Environment,
    pub data_store_override: Option<EnvOverride>,
    pub cookie_secret: Option<String>,
    pub auth0_domain: Option<String>,
    pub auth0_client_id: Option<String>,
    pub auth0_client_secret: Option<String>,
    pub auth0_callback_url: Option<String>,
    pub dev_email: Option<String>,
}

impl ProcessEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let env_name = get("SITE_ENV").or_else(|| get("NODE_ENV"));
        let data_store_override = DATA_STORE_VARS
            .into_iter()
            .find_map(|var| get(var).map(|value| EnvOverride { var, value }));
        Self {
            environment: Environment::parse(env_name.as_deref()),
            data_store_override,
            cookie_secret: get("COOKIE_SECRET"),
            auth0_domain: get("AUTH0_DOMAIN"),
            auth0_client_id: get("AUTH0_CLIENT_ID"),
            auth0_client_secret: get("AUTH0_CLIENT_SECRET"),
            auth0_callback_url: get("AUTH0_CALLBACK_URL"),
            dev_email: get("DEV_EMAIL"),
        }
    }

    /// Fail fast on values the current environment cannot run without.
    pub fn validate(&self) -> AppResult<()> {
        let env = self.environment;
        let mut missing: Vec<&str> = Vec::new();
        if env.is_development() {
            if self.dev_email.is_none() { missing.push("DEV_EMAIL"); }
        } else {
            if self.cookie_secret.is_none() { missing.push("COOKIE_SECRET"); }
            if self.auth0_domain.is_none() { missing.push("AUTH0_DOMAIN"); }
            if self.auth0_client_id.is_none() { missing.push("AUTH0_CLIENT_ID"); }
            if self.auth0_client_secret.is_none() { missing.push("AUTH0_CLIENT_SECRET"); }
        }
        if missing.is_empty() {
            return Ok(());
        }
        Err(AppError::misconfigured(
            "missing_env",
            format!("{} environment requires: {}", env, missing.join(", ")),
        ))
    }

    /// Session signing secret. Development without `COOKIE_SECRET` gets a
    /// random per-process secret; call once per boot.
    pub fn session_secret(&self) -> AppResult<String> {
        if let Some(secret) = &self.cookie_secret {
            return Ok(secret.clone());
        }
        if self.environment.is_development() {
            tracing::warn!(target: "boot", "COOKIE_SECRET unset; sessions signed with an ephemeral secret");
            return ephemeral_secret();
        }
        Err(AppError::misconfigured("missing_env", "COOKIE_SECRET is required outside development"))
    }

    /// Provider credentials, present only when all three are configured.
    pub fn identity_settings(&self) -> Option<IdentityProviderSettings> {
        Some(IdentityProviderSettings {
            domain: self.auth0_domain.clone()?,
            client_id: self.auth0_client_id.clone()?,
            client_secret: self.auth0_client_secret.clone()?,
            callback_url: self
                .auth0_callback_url
                .clone()
                .unwrap_or_else(|| DEFAULT_CALLBACK_URL.to_string()),
        })
    }
}

fn ephemeral_secret() -> AppResult<String> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::internal("secret_entropy", e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}
