//! TF-IDF features with logistic regression.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    classifier_output, confs, encode_targets, not_fitted, read_pipeline, read_record, require_two_classes,
    text_features, write_pipelines,
};
use crate::data::{Batch, ClassSpace, Predictions, Targets};
use crate::error::ModelResult;
use crate::estimators::{LinearModel, LinearParams};
use crate::model::{Model, ModelBase, ModelFamily, ModelOptions, RefitPolicy, StandaloneArtifact, StandalonePaths};
use crate::registry::ModelRegistry;
use crate::store::ArtifactStore;
use crate::strategy::{OneVsRest, StrategyEstimator, StrategyRules};
use crate::text::{to_dense, CountParams, TfidfParams, TfidfVectorizer, TransformerParams};

/// Logistic regression has no native multiclass form: `none` falls back
/// to one-vs-rest over the binary model.
type LinearEstimator = StrategyEstimator<OneVsRest<LinearModel>, LinearModel>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearPipeline {
    vectorizer: TfidfVectorizer,
    estimator: LinearEstimator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearConfs {
    tfidf: TfidfParams,
    linear: LinearParams,
}

#[derive(Debug)]
pub struct ModelTfidfLinear {
    base: ModelBase,
    tfidf: TfidfParams,
    linear: LinearParams,
    pipeline: Option<LinearPipeline>,
}

impl ModelTfidfLinear {
    pub const MODEL_CLASS: &'static str = "ModelTfidfLinear";
    const RULES: StrategyRules = StrategyRules {
        multiclass_strategies: true,
        multi_label: true,
        multi_label_ovr: true,
        multi_label_ovo: false,
    };

    pub fn new(options: &ModelOptions, tfidf: TfidfParams, linear: LinearParams) -> ModelResult<Self> {
        Self::RULES.check(Self::MODEL_CLASS, options.multi_label, options.strategy()?)?;
        tfidf.validate()?;
        linear.validate()?;
        Ok(Self {
            base: ModelBase::create(options, "model_tfidf_linear")?,
            tfidf,
            linear,
            pipeline: None,
        })
    }

    pub fn with_defaults(options: &ModelOptions) -> ModelResult<Self> {
        Self::new(options, TfidfParams::default(), LinearParams::default())
    }

    pub fn linear_params(&self) -> &LinearParams {
        &self.linear
    }

    fn estimator(&self) -> LinearEstimator {
        let binary = LinearModel::logistic(self.linear.clone());
        StrategyEstimator::new(
            self.base.multi_label(),
            self.base.multiclass_strategy(),
            OneVsRest::new(binary.clone()),
            binary,
        )
    }
}

impl Model for ModelTfidfLinear {
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
        "gabarit-linear"
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

        self.pipeline = Some(LinearPipeline { vectorizer, estimator });
        Ok(classes)
    }

    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| not_fitted(&self.base))?;
        let features = text_features(&pipeline.vectorizer, x)?;
        classifier_output(&self.base, pipeline.estimator.predict_proba(features.view()), return_proba)
    }

    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        Ok(confs([
            ("tfidf_count_confs", serde_json::to_value(&self.tfidf.count)?),
            ("tfidf_confs", serde_json::to_value(&self.tfidf.transformer)?),
            ("linear_confs", serde_json::to_value(&self.linear)?),
        ]))
    }

    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()> {
        let confs = LinearConfs {
            tfidf: self.tfidf.clone(),
            linear: self.linear.clone(),
        };
        write_pipelines(&self.base, store, confs, self.pipeline.as_ref(), None)
    }

    fn reproducibility(&self) -> Map<String, Value> {
        self.backend_confs().unwrap_or_default()
    }

    fn reload_from_standalone(&mut self, paths: &StandalonePaths, _registry: &ModelRegistry) -> ModelResult<()> {
        paths.require(&[StandaloneArtifact::Configuration, StandaloneArtifact::Pipeline])?;
        let stored = read_record(Self::MODEL_CLASS, paths)?;
        let pipeline: LinearPipeline = read_pipeline(paths)?;
        let count: Option<CountParams> = stored.extra_field("tfidf_count_confs")?;
        let transformer: Option<TransformerParams> = stored.extra_field("tfidf_confs")?;
        let linear: Option<LinearParams> = stored.extra_field("linear_confs")?;

        let fitted = pipeline.vectorizer.params();
        self.tfidf = TfidfParams {
            count: count.unwrap_or(fitted.count),
            transformer: transformer.unwrap_or(fitted.transformer),
        };
        if let Some(linear) = linear {
            self.linear = linear;
        }
        self.base.restore(&stored);
        self.pipeline = Some(pipeline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;
    use rstest::rstest;

    use super::*;
    use crate::error::ModelError;

    fn opts(root: &std::path::Path, multi_label: bool, strategy: &str) -> ModelOptions {
        ModelOptions::builder()
            .models_root(root)
            .multi_label(multi_label)
            .multiclass_strategy(strategy)
            .build()
    }

    #[test]
    fn multi_label_ovo_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let err = ModelTfidfLinear::with_defaults(&opts(root.path(), true, "ovo")).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[rstest]
    #[case("none")]
    #[case("ovr")]
    #[case("ovo")]
    fn probabilities_follow_class_order(#[case] strategy: &str) {
        let root = tempfile::tempdir().unwrap();
        let linear = LinearParams::builder().lambda(0.01).build().unwrap();
        let mut model = ModelTfidfLinear::new(&opts(root.path(), false, strategy), TfidfParams::default(), linear).unwrap();
        model
            .fit(
                vec!["red apple", "green apple", "blue sky", "grey sky", "dark night", "black night"].into(),
                vec!["fruit", "fruit", "sky", "sky", "night", "night"].into(),
            )
            .unwrap();

        let out = model.predict(vec!["apple", "sky", "night"].into(), true).unwrap();
        let probas = out.batch().and_then(Predictions::probas).unwrap().clone();
        assert_eq!(probas.dim(), (3, 3));
        for row in probas.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
        // classes sorted: fruit, night, sky
        let labels = model.predict(vec!["apple", "sky", "night"].into(), false).unwrap();
        let labels: Vec<String> = labels
            .batch()
            .and_then(Predictions::labels)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(labels, vec!["fruit", "sky", "night"]);
    }
}
