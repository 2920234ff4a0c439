//! Settings of the serving shell.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ModelResult;
use crate::model::DEFAULT_MODELS_ROOT;

pub const MODELS_DIR_VAR: &str = "GABARIT_MODELS_DIR";
pub const MODEL_NAME_VAR: &str = "GABARIT_MODEL_NAME";

/// Which model the serving shell loads, and from where.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub models_root: PathBuf,
    pub model_name: Option<String>,
    /// Default filter for [`init_tracing`](crate::logging::init_tracing).
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from(DEFAULT_MODELS_ROOT),
            model_name: None,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Read `GABARIT_MODELS_DIR` and `GABARIT_MODEL_NAME`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(root) = lookup(MODELS_DIR_VAR).filter(|v| !v.is_empty()) {
            settings.models_root = PathBuf::from(root);
        }
        settings.model_name = lookup(MODEL_NAME_VAR).filter(|v| !v.is_empty());
        settings
    }

    pub fn from_toml(source: &str) -> ModelResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Environment first; a TOML file, when given, replaces what it sets.
    pub fn load(path: Option<&Path>) -> ModelResult<Self> {
        let mut settings = Self::from_env();
        if let Some(path) = path {
            let overrides: SettingsFile = toml::from_str(&fs::read_to_string(path)?)?;
            overrides.apply(&mut settings);
        }
        Ok(settings)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    models_root: Option<PathBuf>,
    model_name: Option<String>,
    log_level: Option<String>,
}

impl SettingsFile {
    fn apply(self, settings: &mut Settings) {
        if let Some(root) = self.models_root {
            settings.models_root = root;
        }
        if let Some(name) = self.model_name {
            settings.model_name = Some(name);
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_lookup() {
        let settings = Settings::from_lookup(|key| match key {
            MODELS_DIR_VAR => Some("/srv/models".to_string()),
            MODEL_NAME_VAR => Some(String::new()),
            _ => None,
        });
        assert_eq!(settings.models_root, PathBuf::from("/srv/models"));
        assert_eq!(settings.model_name, None);

        let defaults = Settings::from_lookup(|_| None);
        assert_eq!(defaults, Settings::default());
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let settings = Settings::from_toml(r#"model_name = "intent""#).unwrap();
        assert_eq!(settings.model_name.as_deref(), Some("intent"));
        assert_eq!(settings.models_root, PathBuf::from(DEFAULT_MODELS_ROOT));
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn file_overrides_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "models_root = \"/data/models\"\nlog_level = \"debug\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.models_root, PathBuf::from("/data/models"));
        assert_eq!(settings.log_level, "debug");
    }
}
