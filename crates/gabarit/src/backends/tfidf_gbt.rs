//! TF-IDF features with gradient boosted trees.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    classifier_output, confs, encode_targets, not_fitted, read_pipeline, read_record, require_two_classes,
    text_features, write_pipelines,
};
use crate::data::{Batch, ClassSpace, Predictions, Targets};
use crate::error::ModelResult;
use crate::estimators::{GbtParams, GradientBoosting};
use crate::model::{Model, ModelBase, ModelFamily, ModelOptions, RefitPolicy, StandaloneArtifact, StandalonePaths};
use crate::registry::ModelRegistry;
use crate::store::ArtifactStore;
use crate::strategy::{StrategyEstimator, StrategyRules};
use crate::text::{to_dense, CountParams, TfidfParams, TfidfVectorizer, TransformerParams};

type GbtEstimator = StrategyEstimator<GradientBoosting, GradientBoosting>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GbtPipeline {
    vectorizer: TfidfVectorizer,
    estimator: GbtEstimator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GbtConfs {
    tfidf: TfidfParams,
    gbt: GbtParams,
}

/// Text classifier: TF-IDF then boosting, with every strategy and
/// multi-label supported.
#[derive(Debug)]
pub struct ModelTfidfGbt {
    base: ModelBase,
    tfidf: TfidfParams,
    gbt: GbtParams,
    pipeline: Option<GbtPipeline>,
}

impl ModelTfidfGbt {
    pub const MODEL_CLASS: &'static str = "ModelTfidfGbt";
    const RULES: StrategyRules = StrategyRules::ALL;

    pub fn new(options: &ModelOptions, tfidf: TfidfParams, gbt: GbtParams) -> ModelResult<Self> {
        Self::RULES.check(Self::MODEL_CLASS, options.multi_label, options.strategy()?)?;
        tfidf.validate()?;
        gbt.validate()?;
        Ok(Self {
            base: ModelBase::create(options, "model_tfidf_gbt")?,
            tfidf,
            gbt,
            pipeline: None,
        })
    }

    pub fn with_defaults(options: &ModelOptions) -> ModelResult<Self> {
        Self::new(options, TfidfParams::default(), GbtParams::default())
    }

    pub fn gbt_params(&self) -> &GbtParams {
        &self.gbt
    }

    pub fn tfidf_params(&self) -> &TfidfParams {
        &self.tfidf
    }

    fn estimator(&self) -> GbtEstimator {
        StrategyEstimator::new(
            self.base.multi_label(),
            self.base.multiclass_strategy(),
            GradientBoosting::new(self.gbt.clone()),
            GradientBoosting::new(self.gbt.clone()),
        )
    }

    fn probas(&self, x: &Batch) -> ModelResult<Array2<f64>> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_fitted(&self.base))?;
        let features = text_features(&pipeline.vectorizer, x)?;
        Ok(pipeline.estimator.predict_proba(features.view()))
    }
}

impl Model for ModelTfidfGbt {
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
        "gabarit-trees"
    }

    fn refit_policy(&self) -> RefitPolicy {
        RefitPolicy::Retrain
    }

    fn fit_batch(&mut self, x: &Batch, y: &Targets) -> ModelResult<ClassSpace> {
        let (classes, targets) = encode_targets(&self.base, y)?;
        require_two_classes(&targets)?;

        let mut vectorizer = TfidfVectorizer::new(self.tfidf.clone());
        let features = to_dense(&vectorizer.fit_transform(x.texts()?)?);
        let mut estimator = self.estimator();
        estimator.fit(features.view(), &targets)?;

        self.pipeline = Some(GbtPipeline { vectorizer, estimator });
        Ok(classes)
    }

    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions> {
        classifier_output(&self.base, self.probas(x)?, return_proba)
    }

    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        Ok(confs([
            ("tfidf_count_confs", serde_json::to_value(&self.tfidf.count)?),
            ("tfidf_confs", serde_json::to_value(&self.tfidf.transformer)?),
            ("gbt_confs", serde_json::to_value(&self.gbt)?),
        ]))
    }

    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()> {
        let confs = GbtConfs {
            tfidf: self.tfidf.clone(),
            gbt: self.gbt.clone(),
        };
        write_pipelines(&self.base, store, confs, self.pipeline.as_ref(), None)
    }

    fn reproducibility(&self) -> Map<String, Value> {
        self.backend_confs().unwrap_or_default()
    }

    fn reload_from_standalone(&mut self, paths: &StandalonePaths, _registry: &ModelRegistry) -> ModelResult<()> {
        paths.require(&[StandaloneArtifact::Configuration, StandaloneArtifact::Pipeline])?;
        let stored = read_record(Self::MODEL_CLASS, paths)?;
        let pipeline: GbtPipeline = read_pipeline(paths)?;
        let count: Option<CountParams> = stored.extra_field("tfidf_count_confs")?;
        let transformer: Option<TransformerParams> = stored.extra_field("tfidf_confs")?;
        let gbt: Option<GbtParams> = stored.extra_field("gbt_confs")?;

        let fitted = pipeline.vectorizer.params();
        self.tfidf = TfidfParams {
            count: count.unwrap_or(fitted.count),
            transformer: transformer.unwrap_or(fitted.transformer),
        };
        self.gbt = gbt.unwrap_or_else(|| self.gbt.clone());
        self.base.restore(&stored);
        self.pipeline = Some(pipeline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::data::{Inputs, Label, Output, Prediction};
    use crate::error::ModelError;

    fn options(root: &std::path::Path) -> ModelOptions {
        ModelOptions::builder().models_root(root).build()
    }

    fn small_gbt() -> GbtParams {
        GbtParams::builder().n_estimators(15).learning_rate(0.3).build().unwrap()
    }

    fn corpus() -> (Vec<&'static str>, Vec<&'static str>) {
        (
            vec!["sunny warm beach", "sunny hot sand", "cold snow ice", "cold frozen ice"],
            vec!["summer", "summer", "winter", "winter"],
        )
    }

    #[test]
    fn fits_and_predicts_labels() {
        let root = tempfile::tempdir().unwrap();
        let mut model = ModelTfidfGbt::new(&options(root.path()), TfidfParams::default(), small_gbt()).unwrap();
        let (x, y) = corpus();
        model.fit(x.into(), y.into()).unwrap();

        assert!(model.is_trained());
        assert_eq!(model.base().classes().as_slice(), &[Label::from("summer"), Label::from("winter")]);
        let out = model.predict("cold ice".into(), false).unwrap();
        assert_eq!(out, Output::Single(Prediction::Label(Label::from("winter"))));
    }

    #[test]
    fn multi_label_predicts_indicators() {
        let root = tempfile::tempdir().unwrap();
        let opts = ModelOptions::builder().models_root(root.path()).multi_label(true).build();
        let mut model = ModelTfidfGbt::new(&opts, TfidfParams::default(), small_gbt()).unwrap();
        let targets = Targets::multi_label(&["hot", "wet"], array![[1, 0], [1, 1], [0, 1], [0, 0]]).unwrap();
        model
            .fit(vec!["sun sand", "sun rain", "rain puddle", "dry rock"].into(), targets)
            .unwrap();

        let out = model.predict(Inputs::from(vec!["sun sand"]), false).unwrap();
        let indicators = out.batch().and_then(Predictions::indicators).unwrap();
        assert_eq!(indicators.dim(), (1, 2));
        assert_eq!(indicators[[0, 0]], 1);
    }

    #[test]
    fn single_class_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let mut model = ModelTfidfGbt::new(&options(root.path()), TfidfParams::default(), small_gbt()).unwrap();
        let err = model.fit(vec!["aa bb", "cc dd"].into(), vec!["x", "x"].into()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
        assert!(!model.is_trained());
    }
}
