//! Ridge regression on standardized tabular features.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    check_regressor_options, confs, no_probabilities, not_fitted, read_pipeline, read_preprocess, read_record,
    regression_targets, write_pipelines,
};
use crate::data::{Batch, ClassSpace, Predictions, Targets};
use crate::error::ModelResult;
use crate::estimators::{LinearModel, LinearParams};
use crate::model::{Model, ModelBase, ModelFamily, ModelOptions, RefitPolicy, StandaloneArtifact, StandalonePaths};
use crate::preprocess::PreprocessPipeline;
use crate::registry::ModelRegistry;
use crate::store::ArtifactStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RidgeConfs {
    linear: LinearParams,
}

#[derive(Debug)]
pub struct ModelRidgeRegressor {
    base: ModelBase,
    linear: LinearParams,
    preprocess: Option<PreprocessPipeline>,
    estimator: Option<LinearModel>,
}

impl ModelRidgeRegressor {
    pub const MODEL_CLASS: &'static str = "ModelRidgeRegressor";

    pub fn new(options: &ModelOptions, linear: LinearParams) -> ModelResult<Self> {
        check_regressor_options(Self::MODEL_CLASS, options)?;
        linear.validate()?;
        Ok(Self {
            base: ModelBase::create(options, "model_ridge_regressor")?,
            linear,
            preprocess: None,
            estimator: None,
        })
    }

    pub fn with_defaults(options: &ModelOptions) -> ModelResult<Self> {
        Self::new(options, LinearParams::default())
    }

    pub fn estimator(&self) -> Option<&LinearModel> {
        self.estimator.as_ref()
    }
}

impl Model for ModelRidgeRegressor {
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
        ModelFamily::Regressor
    }

    fn librairie(&self) -> &'static str {
        "gabarit-linear"
    }

    fn refit_policy(&self) -> RefitPolicy {
        RefitPolicy::Retrain
    }

    fn fit_batch(&mut self, x: &Batch, y: &Targets) -> ModelResult<ClassSpace> {
        let y = regression_targets(y)?;
        let frame = x.frame()?;
        let preprocess = PreprocessPipeline::fit(frame, self.base.x_col(), true)?;
        let features = preprocess.transform(frame)?;

        let mut estimator = LinearModel::squared(self.linear.clone());
        estimator.fit(features.view(), y)?;

        self.base.set_x_col(Some(preprocess.mandatory_columns().to_vec()));
        self.preprocess = Some(preprocess);
        self.estimator = Some(estimator);
        Ok(ClassSpace::default())
    }

    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions> {
        if return_proba {
            return Err(no_probabilities(Self::MODEL_CLASS));
        }
        let (Some(preprocess), Some(estimator)) = (&self.preprocess, &self.estimator) else {
            return Err(not_fitted(&self.base));
        };
        let features = preprocess.transform(x.frame()?)?;
        Ok(Predictions::Values(estimator.predict(features.view())))
    }

    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        let mut entries = confs([("linear_confs", serde_json::to_value(&self.linear)?)]);
        if let Some(preprocess) = &self.preprocess {
            entries.insert("columns_in".into(), serde_json::to_value(preprocess.columns_in())?);
            entries.insert("mandatory_columns".into(), serde_json::to_value(preprocess.mandatory_columns())?);
        }
        Ok(entries)
    }

    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()> {
        let confs = RidgeConfs {
            linear: self.linear.clone(),
        };
        write_pipelines(&self.base, store, confs, self.estimator.as_ref(), self.preprocess.as_ref())
    }

    fn reproducibility(&self) -> Map<String, Value> {
        self.backend_confs().unwrap_or_default()
    }

    fn reload_from_standalone(&mut self, paths: &StandalonePaths, _registry: &ModelRegistry) -> ModelResult<()> {
        paths.require(&[
            StandaloneArtifact::Configuration,
            StandaloneArtifact::Pipeline,
            StandaloneArtifact::PreprocessPipeline,
        ])?;
        let stored = read_record(Self::MODEL_CLASS, paths)?;
        let estimator: LinearModel = read_pipeline(paths)?;
        let preprocess = read_preprocess(paths)?;
        let linear: Option<LinearParams> = stored.extra_field("linear_confs")?;

        self.linear = linear.unwrap_or_else(|| estimator.params().clone());
        self.base.restore(&stored);
        self.preprocess = Some(preprocess);
        self.estimator = Some(estimator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    use super::*;
    use crate::data::Frame;

    #[test]
    fn recovers_a_linear_relation() {
        let root = tempfile::tempdir().unwrap();
        let options = ModelOptions::builder().models_root(root.path()).build();
        let linear = LinearParams::builder().lambda(1e-6).max_iter(500).build().unwrap();
        let mut model = ModelRidgeRegressor::new(&options, linear).unwrap();

        let values = Array2::from_shape_fn((30, 2), |(i, j)| if j == 0 { i as f64 } else { (i * 7 % 5) as f64 });
        let y: Vec<f64> = values.rows().into_iter().map(|r| 3.0 * r[0] - 2.0 * r[1] + 1.0).collect();
        let frame = Frame::from_named(&["a", "b"], values).unwrap();
        model.fit(frame.clone().into(), y.clone().into()).unwrap();

        let out = model.predict(frame.into(), false).unwrap();
        let predicted = out.batch().and_then(Predictions::values).unwrap();
        for (p, t) in predicted.iter().zip(&y) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-2);
        }
    }
}
