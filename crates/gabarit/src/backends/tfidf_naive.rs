//! Super-document scoring: one TF-IDF profile per class.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{classifier_output, confs, encode_targets, not_fitted, read_pipeline, read_record, text_features, write_pipelines};
use crate::data::{Batch, ClassSpace, Predictions, Targets};
use crate::error::{ModelError, ModelResult};
use crate::model::{Model, ModelBase, ModelFamily, ModelOptions, RefitPolicy, StandaloneArtifact, StandalonePaths};
use crate::registry::ModelRegistry;
use crate::store::ArtifactStore;
use crate::strategy::{EncodedTargets, StrategyRules};
use crate::text::{to_dense, CountParams, TfidfParams, TfidfVectorizer, TransformerParams};
use crate::utils::normalize_rows;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NaivePipeline {
    vectorizer: TfidfVectorizer,
    /// `[n_classes, n_features]`.
    profiles: Array2<f64>,
}

/// Scores a document against each class profile by dot product;
/// probabilities are the scores normalized per row.
#[derive(Debug)]
pub struct ModelTfidfNaive {
    base: ModelBase,
    tfidf: TfidfParams,
    pipeline: Option<NaivePipeline>,
}

impl ModelTfidfNaive {
    pub const MODEL_CLASS: &'static str = "ModelTfidfNaive";
    const RULES: StrategyRules = StrategyRules::MONO_LABEL_ONLY;

    pub fn new(options: &ModelOptions, count: CountParams, transformer: TransformerParams) -> ModelResult<Self> {
        if options.multi_label {
            return Err(ModelError::config(format!(
                "{} relies on super documents and cannot be multi_label",
                Self::MODEL_CLASS
            )));
        }
        Self::RULES.check(Self::MODEL_CLASS, options.multi_label, options.strategy()?)?;
        let tfidf = TfidfParams { count, transformer };
        tfidf.validate()?;
        Ok(Self {
            base: ModelBase::create(options, "model_tfidf_naive")?,
            tfidf,
            pipeline: None,
        })
    }

    pub fn with_defaults(options: &ModelOptions) -> ModelResult<Self> {
        Self::new(options, CountParams::default(), TransformerParams::default())
    }

    fn scores(&self, x: &Batch) -> ModelResult<Array2<f64>> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_fitted(&self.base))?;
        let features = text_features(&pipeline.vectorizer, x)?;
        Ok(features.dot(&pipeline.profiles.t()))
    }
}

impl Model for ModelTfidfNaive {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ModelBase {
        &mut self.base
    }

    fn model_class(&self) -> &'static str {
        Self::MODEL_CLASS
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Classifier
    }

    fn librairie(&self) -> &'static str {
        "gabarit-text"
    }

    fn refit_policy(&self) -> RefitPolicy {
        RefitPolicy::Refuse
    }

    fn fit_batch(&mut self, x: &Batch, y: &Targets) -> ModelResult<ClassSpace> {
        let (classes, targets) = encode_targets(&self.base, y)?;
        let EncodedTargets::Classes { indices, n_classes } = targets else {
            return Err(ModelError::invalid_input("super document models are mono-label"));
        };
        let mut vectorizer = TfidfVectorizer::new(self.tfidf.clone());
        let profiles = to_dense(&vectorizer.fit_super_documents(x.texts()?, &indices, n_classes)?);
        self.pipeline = Some(NaivePipeline { vectorizer, profiles });
        Ok(classes)
    }

    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions> {
        classifier_output(&self.base, normalize_rows(self.scores(x)?), return_proba)
    }

    fn class_scores(&self, x: &Batch) -> ModelResult<Array2<f64>> {
        self.scores(x)
    }

    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        Ok(confs([
            ("tfidf_count_confs", serde_json::to_value(&self.tfidf.count)?),
            ("tfidf_confs", serde_json::to_value(&self.tfidf.transformer)?),
            ("with_super_documents", Value::Bool(true)),
        ]))
    }

    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()> {
        write_pipelines(&self.base, store, self.tfidf.clone(), self.pipeline.as_ref(), None)
    }

    fn reload_from_standalone(&mut self, paths: &StandalonePaths, _registry: &ModelRegistry) -> ModelResult<()> {
        paths.require(&[StandaloneArtifact::Configuration, StandaloneArtifact::Pipeline])?;
        let stored = read_record(Self::MODEL_CLASS, paths)?;
        let pipeline: NaivePipeline = read_pipeline(paths)?;
        let count: Option<CountParams> = stored.extra_field("tfidf_count_confs")?;
        let transformer: Option<TransformerParams> = stored.extra_field("tfidf_confs")?;

        let fitted = pipeline.vectorizer.params();
        self.tfidf = TfidfParams {
            count: count.unwrap_or(fitted.count),
            transformer: transformer.unwrap_or(fitted.transformer),
        };
        self.base.restore(&stored);
        self.pipeline = Some(pipeline);
        Ok(())
    }
}
