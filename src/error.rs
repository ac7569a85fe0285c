//! Unified application error model.
//! Boot-time failures (configuration, environment, data store) are returned to
//! whoever invoked the boot; per-request failures render through `IntoResponse`
//! as the generic failure path.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    ConfigRead { code: String, message: String },
    ConfigParse { code: String, message: String },
    Misconfigured { code: String, message: String },
    IdentityHandshake { code: String, message: String },
    NotFound { code: String, message: String },
    DataStore { code: String, message: String },
    Session { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::ConfigRead { code, .. }
            | AppError::ConfigParse { code, .. }
            | AppError::Misconfigured { code, .. }
            | AppError::IdentityHandshake { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::DataStore { code, .. }
            | AppError::Session { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::ConfigRead { message, .. }
            | AppError::ConfigParse { message, .. }
            | AppError::Misconfigured { message, .. }
            | AppError::IdentityHandshake { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::DataStore { message, .. }
            | AppError::Session { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn config_read<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::ConfigRead { code: code.into(), message: msg.into() } }
    pub fn config_parse<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::ConfigParse { code: code.into(), message: msg.into() } }
    pub fn misconfigured<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Misconfigured { code: code.into(), message: msg.into() } }
    pub fn identity<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::IdentityHandshake { code: code.into(), message: msg.into() } }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn data_store<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::DataStore { code: code.into(), message: msg.into() } }
    pub fn session<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Session { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::ConfigRead { .. } => 500,
            AppError::ConfigParse { .. } => 500,
            AppError::Misconfigured { .. } => 500,
            AppError::IdentityHandshake { .. } => 502,
            AppError::NotFound { .. } => 404,
            AppError::DataStore { .. } => 503,
            AppError::Session { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Errors that abort a boot when they occur during `start`.
    pub fn is_fatal_to_boot(&self) -> bool {
        matches!(
            self,
            AppError::ConfigRead { .. }
                | AppError::ConfigParse { .. }
                | AppError::Misconfigured { .. }
                | AppError::DataStore { .. }
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(target: "request", code = self.code_str(), "{}", self.message());
        }
        let body = serde_json::json!({"status": "error", "code": self.code_str(), "error": self.message()});
        (status, Json(body)).into_response()
    }
}
