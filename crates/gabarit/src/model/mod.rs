//! The model lifecycle contract.
//!
//! Every backend implements [`Model`]: construct, [`fit`](Model::fit),
//! [`predict`](Model::predict), [`save`](Model::save) and
//! [`reload_from_standalone`](Model::reload_from_standalone).
//!
//! # Example
//!
//! ```no_run
//! use gabarit::backends::ModelTfidfGbt;
//! use gabarit::model::{Model, ModelOptions};
//!
//! # fn main() -> gabarit::ModelResult<()> {
//! let options = ModelOptions::builder().model_name("intent").build();
//! let mut model = ModelTfidfGbt::with_defaults(&options)?;
//! model.fit(vec!["hello there", "goodbye now"].into(), vec!["greet", "leave"].into())?;
//! let label = model.predict("hello".into(), false)?;
//! model.save(None)?;
//! # Ok(())
//! # }
//! ```

mod base;
mod handle;
mod options;
mod record;
mod standalone;

use std::fmt;
use std::path::Path;

use ndarray::Array2;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

pub use base::ModelBase;
pub use handle::ModelHandle;
pub use options::{LevelSave, ModelFamily, ModelOptions, MulticlassStrategy, DEFAULT_MODELS_ROOT};
pub use record::{ModelRecord, StoredRecord, PACKAGE_VERSION};
pub use standalone::{StandaloneArtifact, StandalonePaths};

use crate::data::{Batch, ClassSpace, Inputs, Label, Output, Predictions, Targets};
use crate::error::{ModelError, ModelResult};
use crate::registry::ModelRegistry;
use crate::store::{ArtifactStore, CONFIGURATION_FILE, GENERATION_FIELD, REPRODUCIBILITY_FILE, USAGE_NOTE_FILE};
use crate::utils::argmax;

/// What a second [`Model::fit`] on a trained model does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefitPolicy {
    /// Fail with [`ModelError::Refit`].
    Refuse,
    /// Retrain from scratch on the new data.
    Retrain,
    /// Fit only the parts not trained yet; trained parts are kept.
    FitUntrained,
}

/// Lifecycle contract shared by every backend and by aggregations.
///
/// Implementors provide the backend hooks (`fit_batch`, `predict_batch`,
/// `write_artifacts`, `reload_from_standalone`); the provided methods
/// enforce the shared rules around them.
pub trait Model: Send + Sync + fmt::Debug {
    fn base(&self) -> &ModelBase;

    fn base_mut(&mut self) -> &mut ModelBase;

    /// Identifier recorded as `model_class` and used by the registry.
    fn model_class(&self) -> &'static str;

    fn family(&self) -> ModelFamily;

    /// Backend family tag recorded as `librairie`.
    fn librairie(&self) -> &'static str;

    fn refit_policy(&self) -> RefitPolicy;

    /// Fit on a non-empty batch and return the observed class space
    /// (empty for regressors).
    fn fit_batch(&mut self, x: &Batch, y: &Targets) -> ModelResult<ClassSpace>;

    /// Predict a batch. Only called on trained models.
    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions>;

    /// Per-class scores used to rank classes, `[n_samples, n_classes]`.
    fn class_scores(&self, x: &Batch) -> ModelResult<Array2<f64>> {
        match self.predict_batch(x, true)? {
            Predictions::Probas(probas) => Ok(probas),
            _ => Err(ModelError::capability(format!(
                "{} does not produce class scores",
                self.model_class()
            ))),
        }
    }

    /// Backend sub-records merged into the configuration document.
    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        Ok(Map::new())
    }

    /// Write the snapshot, plus the standalone and preprocessing pipelines
    /// when the save level includes them.
    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()>;

    /// Warnings prepended to the usage note on save.
    fn usage_caveats(&self) -> Vec<String> {
        Vec::new()
    }

    /// Seeds and hyper-parameters written at `LevelSave::High`.
    fn reproducibility(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Rebuild a trained model from persisted artifacts only.
    ///
    /// Fails with [`ModelError::MissingArgument`] when a required path is
    /// omitted and with [`ModelError::ArtifactNotFound`] when it does not
    /// exist. On failure the model is left unchanged. `model_name` and
    /// `model_dir` are never overwritten.
    fn reload_from_standalone(&mut self, paths: &StandalonePaths, registry: &ModelRegistry) -> ModelResult<()>;

    // -------------------------------------------------------------------------
    // Provided
    // -------------------------------------------------------------------------

    fn model_name(&self) -> &str {
        self.base().model_name()
    }

    fn model_dir(&self) -> &Path {
        self.base().model_dir()
    }

    fn is_trained(&self) -> bool {
        self.base().is_trained()
    }

    fn nb_fit(&self) -> usize {
        self.base().nb_fit()
    }

    fn fit(&mut self, x: Inputs, y: Targets) -> ModelResult<()> {
        let base = self.base();
        if base.is_trained() {
            match self.refit_policy() {
                RefitPolicy::Refuse => {
                    return Err(ModelError::Refit {
                        model_name: base.model_name().to_string(),
                    })
                }
                RefitPolicy::Retrain => {
                    warn!(model_name = %base.model_name(), nb_fit = base.nb_fit(), "model already fitted, retraining from scratch");
                }
                RefitPolicy::FitUntrained => {
                    info!(model_name = %base.model_name(), nb_fit = base.nb_fit(), "model already fitted, fitting untrained parts only");
                }
            }
        }

        let batch = x.into_batch();
        if batch.is_empty() {
            return Err(ModelError::invalid_input("cannot fit on an empty batch"));
        }
        if batch.len() != y.len() {
            return Err(ModelError::invalid_input(format!(
                "{} samples for {} targets",
                batch.len(),
                y.len()
            )));
        }

        let classes = self.fit_batch(&batch, &y)?;
        self.base_mut().mark_fitted(classes);
        let base = self.base();
        info!(
            model_name = %base.model_name(),
            n_samples = batch.len(),
            n_classes = base.classes().len(),
            nb_fit = base.nb_fit(),
            "model fitted"
        );
        Ok(())
    }

    /// Predict labels, values or (with `return_proba`) probabilities.
    ///
    /// A single input yields [`Output::Single`], a batch [`Output::Batch`].
    fn predict(&self, x: Inputs, return_proba: bool) -> ModelResult<Output> {
        if !self.is_trained() {
            return Err(ModelError::NotFitted {
                model_name: self.model_name().to_string(),
            });
        }
        let single = x.is_single();
        let predictions = self.predict_batch(x.as_batch(), return_proba)?;
        if single {
            Ok(Output::Single(predictions.into_single()?))
        } else {
            Ok(Output::Batch(predictions))
        }
    }

    /// Labels and probabilities of a batch in one call.
    fn predict_with_proba(&self, x: Inputs) -> ModelResult<(Predictions, Array2<f64>)> {
        if !self.is_trained() {
            return Err(ModelError::NotFitted {
                model_name: self.model_name().to_string(),
            });
        }
        let batch = x.as_batch();
        let probas = match self.predict_batch(batch, true)? {
            Predictions::Probas(probas) => probas,
            _ => {
                return Err(ModelError::capability(format!(
                    "{} does not produce probabilities",
                    self.model_class()
                )))
            }
        };
        let labels = self.predict_batch(batch, false)?;
        Ok((labels, probas))
    }

    /// 1-based rank of each true label among the class scores, `None` for
    /// labels outside the class space.
    fn get_predict_position(&self, x: Inputs, y_true: &[Label]) -> ModelResult<Vec<Option<usize>>> {
        if self.base().multi_label() {
            return Err(ModelError::capability("get_predict_position is not available for multi-label models"));
        }
        if !self.is_trained() {
            return Err(ModelError::NotFitted {
                model_name: self.model_name().to_string(),
            });
        }
        if x.len() != y_true.len() {
            return Err(ModelError::invalid_input(format!(
                "{} samples for {} labels",
                x.len(),
                y_true.len()
            )));
        }
        let scores = self.class_scores(x.as_batch())?;
        let classes = self.base().classes();
        Ok(y_true
            .iter()
            .zip(scores.rows())
            .map(|(label, row)| {
                classes.index_of(label).map(|index| {
                    let target = row[index];
                    1 + row.iter().filter(|&&score| score > target).count()
                })
            })
            .collect())
    }

    /// Turn batch predictions back into label lists.
    ///
    /// Multi-label indicator rows become the labels set to 1; probability
    /// rows become their most likely class.
    fn inverse_transform(&self, predictions: &Predictions) -> ModelResult<Vec<Vec<Label>>> {
        let classes = self.base().classes();
        match predictions {
            Predictions::Labels(labels) => Ok(labels.iter().map(|l| vec![l.clone()]).collect()),
            Predictions::MultiLabel(indicators) => indicators
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .filter(|(_, &flag)| flag == 1)
                        .map(|(j, _)| classes.decode(j))
                        .collect()
                })
                .collect(),
            Predictions::Probas(probas) => probas
                .rows()
                .into_iter()
                .map(|row| Ok(vec![classes.decode(argmax(row))?]))
                .collect(),
            Predictions::Values(_) => Err(ModelError::capability("regression outputs have no labels")),
        }
    }

    fn save(&self, extra: Option<Map<String, Value>>) -> ModelResult<()> {
        save_model(self, extra)
    }
}

/// Shared save sequence.
///
/// Blobs of the next generation go first, then the usage note, then the
/// configuration document naming that generation. Blobs of older
/// generations are removed last. A save interrupted before the
/// configuration is replaced leaves the previous snapshot loadable.
pub fn save_model<M: Model + ?Sized>(model: &M, extra: Option<Map<String, Value>>) -> ModelResult<()> {
    let base = model.base();
    let store = ArtifactStore::next_generation(base.model_dir())?;
    info!(
        model_name = %base.model_name(),
        level_save = ?base.level_save(),
        model_dir = %store.dir().display(),
        generation = store.generation(),
        "saving model"
    );

    model.write_artifacts(&store)?;
    if base.level_save() == LevelSave::High {
        let mut reproducibility = model.reproducibility();
        reproducibility.insert("package_version".into(), Value::from(PACKAGE_VERSION));
        reproducibility.insert("nb_fit".into(), Value::from(base.nb_fit()));
        store.write_json(REPRODUCIBILITY_FILE, &reproducibility)?;
    }

    store.write_atomic(USAGE_NOTE_FILE, usage_note(model).as_bytes())?;
    for caveat in model.usage_caveats() {
        store.prepend_note(&caveat)?;
    }

    let record = base.record(model.model_class(), model.family(), model.librairie())?;
    let mut document = record.into_document(extra.unwrap_or_default(), model.backend_confs()?)?;
    document.insert(GENERATION_FIELD.into(), Value::from(store.generation()));
    store.write_json(CONFIGURATION_FILE, &document)?;

    // the new generation is committed from here on
    match store.sweep_stale_blobs() {
        Ok(removed) => debug!(removed, "stale blobs removed"),
        Err(err) => warn!(error = %err, model_dir = %store.dir().display(), "could not remove stale blobs"),
    }
    Ok(())
}

fn usage_note<M: Model + ?Sized>(model: &M) -> String {
    let base = model.base();
    let dir_name = base
        .model_dir()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| base.model_name().to_string());
    format!(
        "# {name}\n\n\
         - model class: `{class}`\n\
         - model type: {family}\n\
         - librairie: {librairie}\n\
         - gabarit version: {version}\n\n\
         ## Reloading\n\n\
         Copy this directory under a models root, then:\n\n\
         ```rust\n\
         let registry = ModelRegistry::new(models_root);\n\
         let model = registry.load_model(\"{dir_name}\")?;\n\
         ```\n",
        name = base.model_name(),
        class = model.model_class(),
        family = model.family(),
        librairie = model.librairie(),
        version = PACKAGE_VERSION,
    )
}
