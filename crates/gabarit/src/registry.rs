//! Locating and reloading saved models.
//!
//! The registry owns the models root and the custom aggregation functions
//! that persisted aggregations refer to by name. Loading dispatches on the
//! `model_class` recorded in the configuration document.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::aggregation::{CustomAggregation, ModelAggregationRegressor};
use crate::backends::{
    ModelRfRegressor, ModelRidgeRegressor, ModelTfidfCos, ModelTfidfGbt, ModelTfidfLinear, ModelTfidfNaive,
};
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, ModelHandle, ModelOptions, StandalonePaths, StoredRecord, DEFAULT_MODELS_ROOT};
use crate::store::{self, CONFIGURATION_FILE};

/// Depth of the directory walk below the models root.
const MAX_SEARCH_DEPTH: usize = 3;

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models_root: PathBuf,
    functions: BTreeMap<String, CustomAggregation>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MODELS_ROOT)
    }
}

impl ModelRegistry {
    pub fn new(models_root: impl Into<PathBuf>) -> Self {
        Self {
            models_root: models_root.into(),
            functions: BTreeMap::new(),
        }
    }

    /// Register a custom aggregation function under its name.
    pub fn with_function(mut self, function: CustomAggregation) -> Self {
        self.functions.insert(function.name().to_string(), function);
        self
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    pub fn custom_function(&self, name: &str) -> Option<&CustomAggregation> {
        self.functions.get(name)
    }

    /// Directory of the saved model `name`.
    ///
    /// `{models_root}/{name}` wins; otherwise the first directory named
    /// `name` holding a configuration document, in sorted walk order.
    pub fn find_model_dir(&self, name: &str) -> ModelResult<PathBuf> {
        let direct = self.models_root.join(name);
        if direct.join(CONFIGURATION_FILE).is_file() {
            return Ok(direct);
        }
        search(&self.models_root, name, MAX_SEARCH_DEPTH)?
            .ok_or_else(|| ModelError::ArtifactNotFound(direct))
    }

    /// Rebuild the model saved in `dir`.
    ///
    /// The loaded instance adopts `dir` as its `model_dir` instead of
    /// claiming a fresh directory, so a later save updates the snapshot in
    /// place. Each call yields a new instance on that same directory: load
    /// a name once and share the [`ModelHandle`] rather than loading it
    /// twice, or saves from the two instances overwrite each other.
    pub fn load_dir(&self, dir: &Path) -> ModelResult<Box<dyn Model>> {
        let paths = StandalonePaths::in_dir(dir)?;
        let stored: StoredRecord = store::read_json(&dir.join(CONFIGURATION_FILE))?;
        let model_class = stored
            .model_class
            .as_deref()
            .ok_or_else(|| ModelError::config(format!("{} has no model_class", dir.display())))?;
        let options = ModelOptions {
            model_name: stored.model_name.clone(),
            model_dir: Some(dir.to_path_buf()),
            models_root: self.models_root.clone(),
            ..ModelOptions::default()
        };
        debug!(model_class, dir = %dir.display(), "loading model");

        let mut model: Box<dyn Model> = match model_class {
            ModelTfidfGbt::MODEL_CLASS => Box::new(ModelTfidfGbt::with_defaults(&options)?),
            ModelTfidfLinear::MODEL_CLASS => Box::new(ModelTfidfLinear::with_defaults(&options)?),
            ModelTfidfCos::MODEL_CLASS => Box::new(ModelTfidfCos::with_defaults(&options)?),
            ModelTfidfNaive::MODEL_CLASS => Box::new(ModelTfidfNaive::with_defaults(&options)?),
            ModelRfRegressor::MODEL_CLASS => Box::new(ModelRfRegressor::with_defaults(&options)?),
            ModelRidgeRegressor::MODEL_CLASS => Box::new(ModelRidgeRegressor::with_defaults(&options)?),
            ModelAggregationRegressor::MODEL_CLASS => Box::new(ModelAggregationRegressor::detached(&options)?),
            other => return Err(ModelError::config(format!("unknown model_class `{other}`"))),
        };
        model.reload_from_standalone(&paths, self)?;
        info!(
            model_name = %model.model_name(),
            model_class,
            model_dir = %dir.display(),
            "model loaded"
        );
        Ok(model)
    }

    /// Find and load the saved model `name`.
    pub fn load_boxed(&self, name: &str) -> ModelResult<Box<dyn Model>> {
        let dir = self.find_model_dir(name)?;
        self.load_dir(&dir)
    }

    /// Find and load the saved model `name` behind a shareable handle.
    ///
    /// See [`ModelRegistry::load_dir`] for directory ownership.
    pub fn load_model(&self, name: &str) -> ModelResult<ModelHandle> {
        Ok(ModelHandle::from_boxed(self.load_boxed(name)?))
    }
}

fn search(dir: &Path, name: &str, depth: usize) -> ModelResult<Option<PathBuf>> {
    if depth == 0 || !dir.is_dir() {
        return Ok(None);
    }
    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    children.retain(|path| path.is_dir());
    children.sort();

    for child in &children {
        if child.file_name().is_some_and(|n| n == name) && child.join(CONFIGURATION_FILE).is_file() {
            return Ok(Some(child.clone()));
        }
    }
    for child in &children {
        if let Some(found) = search(child, name, depth - 1)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_directories_are_found() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("family").join("model_1");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join(CONFIGURATION_FILE), "{}").unwrap();
        // same name without a configuration is skipped
        fs::create_dir_all(root.path().join("a").join("model_1")).unwrap();

        let registry = ModelRegistry::new(root.path());
        assert_eq!(registry.find_model_dir("model_1").unwrap(), nested);
        assert!(matches!(
            registry.find_model_dir("model_2"),
            Err(ModelError::ArtifactNotFound(_))
        ));
    }

    #[test]
    fn unknown_class_is_a_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("weird");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(CONFIGURATION_FILE),
            r#"{"model_name": "weird", "model_class": "ModelToto"}"#,
        )
        .unwrap();
        let registry = ModelRegistry::new(root.path());
        assert!(matches!(registry.load_boxed("weird"), Err(ModelError::Configuration(_))));
    }
}
