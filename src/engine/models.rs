use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

use super::options::EngineUtils;

/// One content list as declared in `models/<Name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Seed records, kept in declaration order.
    #[serde(default)]
    pub records: Vec<Value>,
}

impl ModelDefinition {
    /// Backing collection name, with the site's model prefix if any.
    pub fn collection(&self, prefix: Option<&str>) -> String {
        let base = self.name.to_ascii_lowercase();
        match prefix.filter(|p| !p.is_empty()) {
            Some(p) => format!("{}_{}", p, base),
            None => base,
        }
    }

    /// Url segment: the name split at capitals, then slugified.
    pub fn path(&self) -> String {
        let mut words = String::new();
        for (i, ch) in self.name.chars().enumerate() {
            if ch.is_ascii_uppercase() && i > 0 {
                words.push(' ');
            }
            words.push(ch);
        }
        EngineUtils.slugify(&words)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: Vec<String>,
    pub already_registered: Vec<String>,
}

/// Registered models, keyed by name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, ModelDefinition>>,
}

impl ModelRegistry {
    /// Register every `*.json` model under `dir`. A model already registered
    /// is left as it is, so importing twice changes nothing.
    pub async fn import_dir(&self, dir: &Path) -> AppResult<ImportReport> {
        let mut report = ImportReport::default();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "engine", dir = %dir.display(), "no models directory");
                return Ok(report);
            }
            Err(e) => return Err(AppError::config_read("models_read", format!("{}: {}", dir.display(), e))),
        };
        let mut files = Vec::new();
        while let Some(ent) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::config_read("models_read", format!("{}: {}", dir.display(), e)))?
        {
            let path = ent.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| AppError::config_read("models_read", format!("{}: {}", path.display(), e)))?;
            let model: ModelDefinition = serde_json::from_str(&raw)
                .map_err(|e| AppError::config_parse("model_invalid", format!("{}: {}", path.display(), e)))?;
            if self.register(model.clone()) {
                report.added.push(model.name);
            } else {
                report.already_registered.push(model.name);
            }
        }
        info!(target: "engine", added = report.added.len(), unchanged = report.already_registered.len(), "models imported");
        Ok(report)
    }

    /// False when a model of that name was already present.
    pub fn register(&self, model: ModelDefinition) -> bool {
        let mut models = self.models.write();
        if models.contains_key(&model.name) {
            return false;
        }
        models.insert(model.name.clone(), model);
        true
    }

    pub fn get(&self, name: &str) -> Option<ModelDefinition> { self.models.read().get(name).cloned() }

    /// Look a model up by its url segment.
    pub fn by_path(&self, path: &str) -> Option<ModelDefinition> {
        self.models.read().values().find(|m| m.path() == path).cloned()
    }

    pub fn names(&self) -> Vec<String> { self.models.read().keys().cloned().collect() }

    pub fn len(&self) -> usize { self.models.read().len() }

    pub fn is_empty(&self) -> bool { self.models.read().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn naming() {
        let m = ModelDefinition { name: "PostCategory".into(), fields: BTreeMap::new(), records: vec![] };
        assert_eq!(m.path(), "post-category");
        let spaced = ModelDefinition { name: "Blog Post".into(), fields: BTreeMap::new(), records: vec![] };
        assert_eq!(spaced.path(), "blog-post");
        assert_eq!(m.collection(Some("lab")), "lab_postcategory");
        assert_eq!(m.collection(None), "postcategory");
    }

    #[tokio::test]
    async fn import_twice_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let user = json!({"name": "User", "fields": {"email": "Email"}, "records": [{"email": "a@example.org"}]});
        std::fs::write(dir.path().join("User.json"), user.to_string()).unwrap();
        std::fs::write(dir.path().join("Post.json"), r#"{"name":"Post"}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let reg = ModelRegistry::default();
        let first = reg.import_dir(dir.path()).await.unwrap();
        assert_eq!(first.added, ["Post", "User"]);
        let second = reg.import_dir(dir.path()).await.unwrap();
        assert!(second.added.is_empty());
        assert_eq!(second.already_registered, ["Post", "User"]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("User").unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn missing_dir_is_empty_and_bad_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ModelRegistry::default();
        assert_eq!(reg.import_dir(&dir.path().join("models")).await.unwrap(), ImportReport::default());

        std::fs::write(dir.path().join("Broken.json"), "{").unwrap();
        let err = reg.import_dir(dir.path()).await.unwrap_err();
        assert_eq!(err.code_str(), "model_invalid");
    }
}
