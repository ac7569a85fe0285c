use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Deployment environment, resolved once per boot and threaded through every
/// component that branches on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    #[default]
    Production,
}

impl Environment {
    /// Anything other than an explicit `development` or `staging` is production.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("development") => Environment::Development,
            Some("staging") => Environment::Staging,
            _ => Environment::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool { matches!(self, Environment::Development) }

    /// Label appended to the admin brand outside development.
    pub fn brand_suffix(&self) -> Option<&'static str> {
        match self {
            Environment::Development => None,
            Environment::Staging => Some("QA"),
            Environment::Production => Some("Production"),
        }
    }

    pub fn annotate_brand(&self, name: &str) -> String {
        match self.brand_suffix() {
            Some(suffix) => format!("{} ({})", name, suffix),
            None => name.to_string(),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
