//! Bookkeeping shared by every model.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::options::{LevelSave, ModelFamily, ModelOptions, MulticlassStrategy};
use super::record::{ModelRecord, StoredRecord, PACKAGE_VERSION};
use crate::data::ClassSpace;
use crate::error::{ModelError, ModelResult};
use crate::utils::{date_stamp, dir_stamp, now_local_or_utc};

const MAX_DIR_ATTEMPTS: usize = 10_000;

/// Identity and training state of a model.
///
/// Backends embed one and expose it through
/// [`Model::base`](super::Model::base).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBase {
    model_name: String,
    model_dir: PathBuf,
    trained: bool,
    nb_fit: usize,
    x_col: Option<Vec<String>>,
    y_col: Option<Vec<String>>,
    classes: ClassSpace,
    multi_label: bool,
    multiclass_strategy: MulticlassStrategy,
    level_save: LevelSave,
}

impl ModelBase {
    /// Validate `options` and claim the model directory.
    ///
    /// Without an explicit `model_dir`, a fresh directory
    /// `{models_root}/{model_name}/{model_name}_{timestamp}` is created; a
    /// numeric suffix is appended when that name is already taken. An
    /// explicit `model_dir` is adopted as is, snapshot included; the
    /// registry relies on this to reload a model in place.
    pub fn create(options: &ModelOptions, default_name: &str) -> ModelResult<Self> {
        let multiclass_strategy = options.strategy()?;
        let model_name = options.model_name.clone().unwrap_or_else(|| default_name.to_string());
        if model_name.is_empty() || model_name.contains(['/', '\\']) {
            return Err(ModelError::config(format!("invalid model_name `{model_name}`")));
        }

        let model_dir = match &options.model_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => allocate_model_dir(&options.models_root, &model_name)?,
        };
        info!(model_name = %model_name, model_dir = %model_dir.display(), "model created");

        Ok(Self {
            model_name,
            model_dir,
            trained: false,
            nb_fit: 0,
            x_col: options.x_col.clone(),
            y_col: options.y_col.clone(),
            classes: ClassSpace::default(),
            multi_label: options.multi_label,
            multiclass_strategy,
            level_save: options.level_save,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn nb_fit(&self) -> usize {
        self.nb_fit
    }

    pub fn x_col(&self) -> Option<&[String]> {
        self.x_col.as_deref()
    }

    pub fn y_col(&self) -> Option<&[String]> {
        self.y_col.as_deref()
    }

    pub fn classes(&self) -> &ClassSpace {
        &self.classes
    }

    pub fn multi_label(&self) -> bool {
        self.multi_label
    }

    pub fn multiclass_strategy(&self) -> MulticlassStrategy {
        self.multiclass_strategy
    }

    pub fn level_save(&self) -> LevelSave {
        self.level_save
    }

    /// Record a successful fit.
    pub(crate) fn mark_fitted(&mut self, classes: ClassSpace) {
        self.trained = true;
        self.nb_fit += 1;
        self.classes = classes;
    }

    /// Mark trained without a fit of its own (aggregations).
    pub(crate) fn mark_trained(&mut self) {
        self.trained = true;
        self.nb_fit += 1;
    }

    pub(crate) fn set_x_col(&mut self, x_col: Option<Vec<String>>) {
        self.x_col = x_col;
    }

    /// Apply persisted state. Identity (`model_name`, `model_dir`) is kept.
    ///
    /// `trained` and `nb_fit` default to a trained, once-fitted model;
    /// absent columns and save level keep the current values.
    pub(crate) fn restore(&mut self, stored: &StoredRecord) {
        self.trained = stored.trained.unwrap_or(true);
        self.nb_fit = stored.nb_fit.unwrap_or(1);
        if let Some(x_col) = &stored.x_col {
            self.x_col = x_col.clone();
        }
        if let Some(y_col) = &stored.y_col {
            self.y_col = y_col.clone();
        }
        if let Some(classes) = &stored.list_classes {
            self.classes = ClassSpace::from_persisted(classes.clone());
        }
        if let Some(multi_label) = stored.multi_label {
            self.multi_label = multi_label;
        }
        if let Some(strategy) = stored.multiclass_strategy {
            self.multiclass_strategy = strategy;
        }
        if let Some(level_save) = stored.level_save {
            self.level_save = level_save;
        }
        debug!(model_name = %self.model_name, nb_fit = self.nb_fit, "state restored");
    }

    /// Project the persistable fields.
    pub fn record(&self, model_class: &str, family: ModelFamily, librairie: &str) -> ModelResult<ModelRecord> {
        let has_classes = family == ModelFamily::Classifier && !self.classes.is_empty();
        Ok(ModelRecord {
            package_version: PACKAGE_VERSION.to_string(),
            model_name: self.model_name.clone(),
            model_class: model_class.to_string(),
            model_type: family,
            model_dir: self.model_dir.clone(),
            trained: self.trained,
            nb_fit: self.nb_fit,
            x_col: self.x_col.clone(),
            y_col: self.y_col.clone(),
            list_classes: has_classes.then(|| self.classes.as_slice().to_vec()),
            dict_classes: has_classes.then(|| self.classes.dict()),
            multi_label: self.multi_label,
            multiclass_strategy: self.multiclass_strategy,
            level_save: self.level_save,
            librairie: librairie.to_string(),
            date: date_stamp(now_local_or_utc())?,
        })
    }
}

fn allocate_model_dir(root: &Path, model_name: &str) -> ModelResult<PathBuf> {
    let parent = root.join(model_name);
    fs::create_dir_all(&parent)?;
    let stem = format!("{model_name}_{}", dir_stamp(now_local_or_utc())?);
    for attempt in 0..MAX_DIR_ATTEMPTS {
        let candidate = if attempt == 0 {
            parent.join(&stem)
        } else {
            parent.join(format!("{stem}_{attempt}"))
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ModelError::config(format!(
        "could not allocate a model directory under {}",
        parent.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_never_shared() {
        let root = tempfile::tempdir().unwrap();
        let options = ModelOptions::builder().models_root(root.path()).build();
        let a = ModelBase::create(&options, "model").unwrap();
        let b = ModelBase::create(&options, "model").unwrap();

        assert_ne!(a.model_dir(), b.model_dir());
        assert!(a.model_dir().is_dir() && b.model_dir().is_dir());
        assert!(a.model_dir().starts_with(root.path().join("model")));
        assert!(!a.is_trained());
        assert_eq!(a.nb_fit(), 0);
    }

    #[test]
    fn explicit_dir_is_created() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("here");
        let options = ModelOptions::builder().model_dir(&dir).build();
        let base = ModelBase::create(&options, "model").unwrap();
        assert_eq!(base.model_dir(), dir);
        assert!(dir.is_dir());
    }

    #[test]
    fn bad_strategy_fails_before_allocating() {
        let root = tempfile::tempdir().unwrap();
        let options = ModelOptions::builder()
            .models_root(root.path())
            .multiclass_strategy("toto")
            .build();
        assert!(matches!(ModelBase::create(&options, "model"), Err(ModelError::Configuration(_))));
        assert!(!root.path().join("model").exists());
    }

    #[test]
    fn restore_keeps_identity_and_applies_defaults() {
        let root = tempfile::tempdir().unwrap();
        let options = ModelOptions::builder()
            .models_root(root.path())
            .x_col(vec!["a".to_string()])
            .build();
        let mut base = ModelBase::create(&options, "model").unwrap();
        let dir = base.model_dir().to_path_buf();

        let stored: StoredRecord = serde_json::from_value(serde_json::json!({
            "model_name": "other",
            "list_classes": ["x", "y"],
        }))
        .unwrap();
        base.restore(&stored);

        assert_eq!(base.model_name(), "model");
        assert_eq!(base.model_dir(), dir);
        assert!(base.is_trained());
        assert_eq!(base.nb_fit(), 1);
        assert_eq!(base.x_col(), Some(&["a".to_string()][..]));
        assert_eq!(base.classes().len(), 2);
    }
}
