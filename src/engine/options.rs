use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::NavTree;
use crate::datastore::DataStoreAddress;
use crate::environment::Environment;
use crate::error::{AppError, AppResult};

/// Helpers handed to templates and handlers through the locals bag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineUtils;

impl EngineUtils {
    /// Lowercase, ascii-alphanumeric words joined by single dashes.
    pub fn slugify(&self, text: &str) -> String {
        text.split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Locals {
    pub env: Environment,
    #[serde(skip)]
    pub utils: EngineUtils,
    pub editable: bool,
}

impl Locals {
    pub fn for_environment(env: Environment) -> Self {
        Self { env, utils: EngineUtils, editable: true }
    }
}

/// Media-library settings. The prefix keeps one site's uploads apart from another's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CloudinaryOptions {
    pub prefix: Option<String>,
    pub folders: bool,
    pub secure: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub brand: String,
    pub module_root: PathBuf,
    pub model_prefix: Option<String>,
    pub data_store: DataStoreAddress,
    pub frame_guard: bool,
    pub auto_update: bool,
    pub session: bool,
    pub user_model: String,
    pub locals: Locals,
    pub cloudinary: CloudinaryOptions,
    pub admin_path: Option<String>,
    pub nav: Option<NavTree>,
    pub wysiwyg_additional_buttons: Option<String>,
    pub routes: Option<String>,
    /// Settings the engine has no typed field for, kept as given.
    pub extra: BTreeMap<String, Value>,
}

impl EngineOptions {
    pub fn new(brand: impl Into<String>, module_root: impl Into<PathBuf>, data_store: DataStoreAddress) -> Self {
        Self {
            brand: brand.into(),
            module_root: module_root.into(),
            model_prefix: None,
            data_store,
            frame_guard: true,
            auto_update: false,
            session: false,
            user_model: "User".to_string(),
            locals: Locals::default(),
            cloudinary: CloudinaryOptions::default(),
            admin_path: None,
            nav: None,
            wysiwyg_additional_buttons: None,
            routes: None,
            extra: BTreeMap::new(),
        }
    }

    /// Apply one named setting. Known keys must carry the right JSON type.
    pub fn set(&mut self, key: &str, value: Value) -> AppResult<()> {
        match key {
            "brand" => self.brand = expect_str(key, value)?,
            "module root" => self.module_root = PathBuf::from(expect_str(key, value)?),
            "model prefix" => self.model_prefix = expect_opt_str(key, value)?,
            "mongo" => {
                let uri = expect_str(key, value)?;
                self.data_store = DataStoreAddress::resolve(None, Some(uri.as_str()), "");
            }
            "frame guard" => self.frame_guard = expect_bool(key, value)?,
            "auto update" => self.auto_update = expect_bool(key, value)?,
            "session" => self.session = expect_bool(key, value)?,
            "user model" => self.user_model = expect_str(key, value)?,
            "cloudinary prefix" => self.cloudinary.prefix = expect_opt_str(key, value)?,
            "cloudinary folders" => self.cloudinary.folders = expect_bool(key, value)?,
            "cloudinary secure" => self.cloudinary.secure = expect_bool(key, value)?,
            "admin path" => self.admin_path = expect_opt_str(key, value)?,
            "nav" => self.nav = if value.is_null() { None } else { Some(NavTree(value)) },
            "wysiwyg additional buttons" => self.wysiwyg_additional_buttons = expect_opt_str(key, value)?,
            "routes" => self.routes = expect_opt_str(key, value)?,
            _ => {
                debug!(target: "engine", key, "keeping untyped engine setting");
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, wanted: &str, got: &Value) -> AppError {
    AppError::misconfigured("engine_setting_invalid", format!("'{}' expects {}, got {}", key, wanted, got))
}

fn expect_str(key: &str, value: Value) -> AppResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(invalid(key, "a string", &other)),
    }
}

fn expect_opt_str(key: &str, value: Value) -> AppResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        other => expect_str(key, other).map(Some),
    }
}

fn expect_bool(key: &str, value: Value) -> AppResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(invalid(key, "true or false", &other)),
    }
}

/// Caller-supplied engine settings, applied in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    entries: Vec<(String, Value)>,
}

impl EngineSettings {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Parse `key=value`. The value is read as JSON when it parses, else as a string.
    pub fn parse_pair(raw: &str) -> AppResult<(String, Value)> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| AppError::misconfigured("engine_setting_invalid", format!("expected key=value, got '{}'", raw)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::misconfigured("engine_setting_invalid", format!("empty key in '{}'", raw)));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        Ok((key.to_string(), value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
