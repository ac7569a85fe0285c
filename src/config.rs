//! Site configuration loader.
//!
//! The configuration is a JSON document read once per boot. Only `name` and
//! `database` are required; everything else tunes the admin surface.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Admin navigation tree. Opaque here; handed to the engine as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NavTree(pub serde_json::Value);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfiguration {
    pub name: String,
    /// Data-store name; also used as the media prefix.
    pub database: String,
    #[serde(default)]
    pub db_prefix: Option<String>,
    #[serde(default, rename = "adminPath")]
    pub admin_path: Option<String>,
    #[serde(default)]
    pub admin_nav: Option<NavTree>,
    #[serde(default)]
    pub allowed_domains: Option<Vec<String>>,
}

impl SiteConfiguration {
    pub fn from_json(raw: &str, source: &str) -> AppResult<Self> {
        let cfg: SiteConfiguration = serde_json::from_str(raw)
            .map_err(|e| AppError::config_parse("config_parse", format!("{}: {}", source, e)))?;
        if cfg.name.trim().is_empty() {
            return Err(AppError::config_parse("config_invalid", format!("{}: 'name' must not be empty", source)));
        }
        if cfg.database.trim().is_empty() {
            return Err(AppError::config_parse("config_invalid", format!("{}: 'database' must not be empty", source)));
        }
        Ok(cfg)
    }

    /// Domain whitelist, only when at least one domain is listed.
    pub fn whitelist(&self) -> Option<&[String]> {
        self.allowed_domains.as_deref().filter(|d| !d.is_empty())
    }
}

/// Read and parse the configuration at `path`.
pub async fn load_site_config(path: impl AsRef<Path>) -> AppResult<SiteConfiguration> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::config_read("config_read", format!("{}: {}", path.display(), e)))?;
    SiteConfiguration::from_json(&raw, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minimal_config_parses() {
        let cfg = SiteConfiguration::from_json(r#"{"name":"Site","database":"sitedb"}"#, "inline").unwrap();
        assert_eq!(cfg.name, "Site");
        assert_eq!(cfg.database, "sitedb");
        assert!(cfg.admin_path.is_none());
        assert!(cfg.whitelist().is_none());
    }

    #[test]
    fn camel_case_admin_path_and_nav() {
        let cfg = SiteConfiguration::from_json(
            r#"{"name":"Site","database":"sitedb","adminPath":"backend","db_prefix":"lab",
                "admin_nav":{"people":["Person"]},"allowed_domains":["https://a.org"],"extra":1}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(cfg.admin_path.as_deref(), Some("backend"));
        assert_eq!(cfg.db_prefix.as_deref(), Some("lab"));
        assert_eq!(cfg.admin_nav.as_ref().unwrap().0["people"][0], "Person");
        assert_eq!(cfg.whitelist().unwrap(), ["https://a.org".to_string()]);
    }

    #[test]
    fn empty_domain_list_is_no_whitelist() {
        let cfg = SiteConfiguration::from_json(r#"{"name":"S","database":"d","allowed_domains":[]}"#, "inline").unwrap();
        assert!(cfg.whitelist().is_none());
    }

    #[test]
    fn missing_database_is_parse_error() {
        let err = SiteConfiguration::from_json(r#"{"name":"Site"}"#, "inline").unwrap_err();
        assert!(matches!(err, AppError::ConfigParse { .. }));
        let err = SiteConfiguration::from_json(r#"{"name":"Site","database":" "}"#, "inline").unwrap_err();
        assert!(matches!(err, AppError::ConfigParse { .. }));
    }

    #[tokio::test]
    async fn unreadable_and_malformed_sources() {
        let tmp = tempdir().unwrap();
        let err = load_site_config(tmp.path().join("missing.json")).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigRead { .. }));

        let bad = tmp.path().join("bad.json");
        std::fs::write(&bad, "{ name: Site").unwrap();
        let err = load_site_config(&bad).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigParse { .. }));

        let good = tmp.path().join("config.json");
        std::fs::write(&good, r#"{"name":"Site","database":"sitedb"}"#).unwrap();
        assert_eq!(load_site_config(&good).await.unwrap().database, "sitedb");
    }
}
