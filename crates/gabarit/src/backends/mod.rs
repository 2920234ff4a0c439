//! Concrete backends.
//!
//! | backend                 | family     | input  | strategies        | refit   |
//! |-------------------------|------------|--------|-------------------|---------|
//! | [`ModelTfidfCos`]       | classifier | texts  | none              | refuse  |
//! | [`ModelTfidfNaive`]     | classifier | texts  | none              | refuse  |
//! | [`ModelTfidfGbt`]       | classifier | texts  | all, multi-label  | retrain |
//! | [`ModelTfidfLinear`]    | classifier | texts  | all but ml + ovo  | retrain |
//! | [`ModelRfRegressor`]    | regressor  | frame  | none              | retrain |
//! | [`ModelRidgeRegressor`] | regressor  | frame  | none              | retrain |

mod rf;
mod ridge;
mod tfidf_cos;
mod tfidf_gbt;
mod tfidf_linear;
mod tfidf_naive;

use ndarray::{Array2, ArrayView2};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub use rf::ModelRfRegressor;
pub use ridge::ModelRidgeRegressor;
pub use tfidf_cos::ModelTfidfCos;
pub use tfidf_gbt::ModelTfidfGbt;
pub use tfidf_linear::ModelTfidfLinear;
pub use tfidf_naive::ModelTfidfNaive;

use crate::data::{Batch, ClassSpace, Predictions, Targets};
use crate::error::{ModelError, ModelResult};
use crate::model::{ModelBase, ModelOptions, MulticlassStrategy, StandaloneArtifact, StandalonePaths, StoredRecord};
use crate::preprocess::PreprocessPipeline;
use crate::store::{self, snapshot_file, ArtifactKind, ArtifactStore, PREPROCESS_PIPELINE_FILE, STANDALONE_PIPELINE_FILE};
use crate::strategy::EncodedTargets;
use crate::text::{to_dense, TfidfVectorizer};
use crate::utils::argmax;

/// Probability at or above which a label is predicted in multi-label mode.
pub const MULTI_LABEL_THRESHOLD: f64 = 0.5;

/// Snapshot blob `{model_name}.bin`: hyper-parameters plus fitted state.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Snapshot<P, S> {
    pub confs: P,
    pub pipeline: Option<S>,
}

// =============================================================================
// Targets and outputs
// =============================================================================

/// Encode classification targets according to the model's label mode.
pub(crate) fn encode_targets(base: &ModelBase, y: &Targets) -> ModelResult<(ClassSpace, EncodedTargets)> {
    match (base.multi_label(), y) {
        (false, Targets::Labels(labels)) => {
            let classes = ClassSpace::from_labels(labels);
            let indices = classes.encode(labels)?;
            let n_classes = classes.len();
            Ok((classes, EncodedTargets::Classes { indices, n_classes }))
        }
        (true, Targets::MultiLabel { columns, values }) => {
            Ok((ClassSpace::from_columns(columns), EncodedTargets::Indicators(values.clone())))
        }
        (true, _) => Err(ModelError::invalid_input(
            "multi-label models expect an indicator matrix with named label columns",
        )),
        (false, _) => Err(ModelError::invalid_input("classifiers expect one label per sample")),
    }
}

/// Mono-label strategy backends need two classes to discriminate.
pub(crate) fn require_two_classes(targets: &EncodedTargets) -> ModelResult<()> {
    match targets {
        EncodedTargets::Classes { n_classes, .. } if *n_classes < 2 => Err(ModelError::invalid_input(
            "at least two distinct classes are required",
        )),
        _ => Ok(()),
    }
}

pub(crate) fn threshold(probas: &Array2<f64>) -> Array2<u8> {
    probas.mapv(|p| u8::from(p >= MULTI_LABEL_THRESHOLD))
}

/// Shape classifier probabilities as requested.
pub(crate) fn classifier_output(
    base: &ModelBase,
    probas: Array2<f64>,
    return_proba: bool,
) -> ModelResult<Predictions> {
    if return_proba {
        return Ok(Predictions::Probas(probas));
    }
    if base.multi_label() {
        return Ok(Predictions::MultiLabel(threshold(&probas)));
    }
    let classes = base.classes();
    probas
        .rows()
        .into_iter()
        .map(|row| classes.decode(argmax(row)))
        .collect::<ModelResult<Vec<_>>>()
        .map(Predictions::Labels)
}

pub(crate) fn no_probabilities(model_class: &str) -> ModelError {
    ModelError::capability(format!("{model_class} does not provide probabilities"))
}

pub(crate) fn not_fitted(base: &ModelBase) -> ModelError {
    ModelError::NotFitted {
        model_name: base.model_name().to_string(),
    }
}

/// Dense TF-IDF features of a text batch.
pub(crate) fn text_features(vectorizer: &TfidfVectorizer, x: &Batch) -> ModelResult<Array2<f64>> {
    Ok(to_dense(&vectorizer.transform(x.texts()?)?))
}

/// Cosine similarity of every row of `a` with every row of `b`.
pub(crate) fn cosine_similarity(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
    let norm = |m: ArrayView2<'_, f64>| m.rows().into_iter().map(|r| r.dot(&r).sqrt()).collect::<Vec<_>>();
    let (norm_a, norm_b) = (norm(a), norm(b));
    let mut similarity = a.dot(&b.t());
    for ((i, j), value) in similarity.indexed_iter_mut() {
        let denominator = norm_a[i] * norm_b[j];
        *value = if denominator > 0.0 { *value / denominator } else { 0.0 };
    }
    similarity
}

// =============================================================================
// Construction checks
// =============================================================================

pub(crate) fn check_regressor_options(model_class: &str, options: &ModelOptions) -> ModelResult<()> {
    if options.multi_label {
        return Err(ModelError::config(format!("{model_class} is a regressor and cannot be multi_label")));
    }
    if options.strategy()? != MulticlassStrategy::None {
        return Err(ModelError::config(format!(
            "{model_class} is a regressor and does not accept a multiclass_strategy"
        )));
    }
    Ok(())
}

pub(crate) fn regression_targets(y: &Targets) -> ModelResult<ndarray::ArrayView1<'_, f64>> {
    match y {
        Targets::Values(values) => Ok(values.view()),
        _ => Err(ModelError::invalid_input("regressors expect continuous targets")),
    }
}

// =============================================================================
// Artifacts
// =============================================================================

/// Write the snapshot and, at MEDIUM/HIGH, the standalone and preprocessing
/// pipelines of a fitted model.
pub(crate) fn write_pipelines<P: Serialize, S: Serialize>(
    base: &ModelBase,
    store: &ArtifactStore,
    confs: P,
    pipeline: Option<&S>,
    preprocess: Option<&PreprocessPipeline>,
) -> ModelResult<()> {
    let snapshot = Snapshot { confs, pipeline };
    store.write_blob(&snapshot_file(base.model_name()), ArtifactKind::Snapshot, &snapshot)?;
    if !base.level_save().includes_pipelines() {
        return Ok(());
    }
    if let Some(pipeline) = pipeline {
        store.write_blob(STANDALONE_PIPELINE_FILE, ArtifactKind::Pipeline, pipeline)?;
    }
    if let Some(preprocess) = preprocess {
        store.write_blob(PREPROCESS_PIPELINE_FILE, ArtifactKind::Preprocess, preprocess)?;
    }
    Ok(())
}

/// Read the configuration document and check it belongs to `model_class`.
pub(crate) fn read_record(model_class: &str, paths: &StandalonePaths) -> ModelResult<StoredRecord> {
    let stored = StoredRecord::read(paths.path(StandaloneArtifact::Configuration)?)?;
    match stored.model_class.as_deref() {
        Some(found) if found != model_class => Err(ModelError::config(format!(
            "configuration describes a {found}, not a {model_class}"
        ))),
        _ => Ok(stored),
    }
}

pub(crate) fn read_pipeline<T: DeserializeOwned>(paths: &StandalonePaths) -> ModelResult<T> {
    store::read_blob(paths.path(StandaloneArtifact::Pipeline)?, ArtifactKind::Pipeline)
}

pub(crate) fn read_preprocess(paths: &StandalonePaths) -> ModelResult<PreprocessPipeline> {
    store::read_blob(
        paths.path(StandaloneArtifact::PreprocessPipeline)?,
        ArtifactKind::Preprocess,
    )
}

/// Serialize `(key, value)` pairs into a configuration sub-record map.
pub(crate) fn confs<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries.into_iter().map(|(key, value)| (key.to_string(), value)).collect()
}
