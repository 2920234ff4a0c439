//! Random forest regressor on tabular data.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    check_regressor_options, confs, no_probabilities, not_fitted, read_pipeline, read_preprocess, read_record,
    regression_targets, write_pipelines,
};
use crate::data::{Batch, ClassSpace, Predictions, Targets};
use crate::error::ModelResult;
use crate::estimators::{ForestParams, RandomForestRegressor};
use crate::model::{Model, ModelBase, ModelFamily, ModelOptions, RefitPolicy, StandaloneArtifact, StandalonePaths};
use crate::preprocess::PreprocessPipeline;
use crate::registry::ModelRegistry;
use crate::store::ArtifactStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RfConfs {
    rf: ForestParams,
    random_seed: u64,
}

#[derive(Debug)]
pub struct ModelRfRegressor {
    base: ModelBase,
    rf: ForestParams,
    random_seed: u64,
    preprocess: Option<PreprocessPipeline>,
    forest: Option<RandomForestRegressor>,
}

impl ModelRfRegressor {
    pub const MODEL_CLASS: &'static str = "ModelRfRegressor";

    /// The seed comes from `options.random_seed`, or is drawn once here.
    pub fn new(options: &ModelOptions, rf: ForestParams) -> ModelResult<Self> {
        check_regressor_options(Self::MODEL_CLASS, options)?;
        rf.validate()?;
        Ok(Self {
            base: ModelBase::create(options, "model_rf_regressor")?,
            rf,
            random_seed: options.random_seed.unwrap_or_else(|| rand::thread_rng().gen()),
            preprocess: None,
            forest: None,
        })
    }

    pub fn with_defaults(options: &ModelOptions) -> ModelResult<Self> {
        Self::new(options, ForestParams::default())
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn forest(&self) -> Option<&RandomForestRegressor> {
        self.forest.as_ref()
    }
}

impl Model for ModelRfRegressor {
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
        "gabarit-trees"
    }

    fn refit_policy(&self) -> RefitPolicy {
        RefitPolicy::Retrain
    }

    fn fit_batch(&mut self, x: &Batch, y: &Targets) -> ModelResult<ClassSpace> {
        let y = regression_targets(y)?;
        let frame = x.frame()?;
        let preprocess = PreprocessPipeline::fit(frame, self.base.x_col(), false)?;
        let features = preprocess.transform(frame)?;

        let mut forest = RandomForestRegressor::new(self.rf.clone());
        forest.fit(features.view(), y, self.random_seed)?;

        self.base.set_x_col(Some(preprocess.mandatory_columns().to_vec()));
        self.preprocess = Some(preprocess);
        self.forest = Some(forest);
        Ok(ClassSpace::default())
    }

    fn predict_batch(&self, x: &Batch, return_proba: bool) -> ModelResult<Predictions> {
        if return_proba {
            return Err(no_probabilities(Self::MODEL_CLASS));
        }
        let (Some(preprocess), Some(forest)) = (&self.preprocess, &self.forest) else {
            return Err(not_fitted(&self.base));
        };
        let features = preprocess.transform(x.frame()?)?;
        Ok(Predictions::Values(forest.predict(features.view())))
    }

    fn backend_confs(&self) -> ModelResult<Map<String, Value>> {
        let mut entries = confs([
            ("rf_confs", serde_json::to_value(&self.rf)?),
            ("random_seed", Value::from(self.random_seed)),
        ]);
        if let Some(preprocess) = &self.preprocess {
            entries.insert("columns_in".into(), serde_json::to_value(preprocess.columns_in())?);
            entries.insert("mandatory_columns".into(), serde_json::to_value(preprocess.mandatory_columns())?);
        }
        Ok(entries)
    }

    fn write_artifacts(&self, store: &ArtifactStore) -> ModelResult<()> {
        let confs = RfConfs {
            rf: self.rf.clone(),
            random_seed: self.random_seed,
        };
        write_pipelines(&self.base, store, confs, self.forest.as_ref(), self.preprocess.as_ref())
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
        let forest: RandomForestRegressor = read_pipeline(paths)?;
        let preprocess = read_preprocess(paths)?;
        let rf: Option<ForestParams> = stored.extra_field("rf_confs")?;
        let random_seed: Option<u64> = stored.extra_field("random_seed")?;

        self.rf = rf.unwrap_or_else(|| forest.params().clone());
        if let Some(seed) = random_seed {
            self.random_seed = seed;
        }
        self.base.restore(&stored);
        self.preprocess = Some(preprocess);
        self.forest = Some(forest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};

    use super::*;
    use crate::data::{Frame, Inputs, Prediction};
    use crate::error::ModelError;

    fn frame() -> Frame {
        let values = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 3) as f64 });
        Frame::from_named(&["x", "noise"], values).unwrap()
    }

    fn targets() -> Targets {
        Targets::from((0..20).map(|i| 2.0 * i as f64).collect::<Vec<_>>())
    }

    fn model(root: &std::path::Path, seed: u64) -> ModelRfRegressor {
        let options = ModelOptions::builder().models_root(root).random_seed(seed).build();
        let rf = ForestParams::builder().n_estimators(10).build().unwrap();
        ModelRfRegressor::new(&options, rf).unwrap()
    }

    #[test]
    fn same_seed_same_forest() {
        let root = tempfile::tempdir().unwrap();
        let mut a = model(root.path(), 7);
        let mut b = model(root.path(), 7);
        a.fit(frame().into(), targets()).unwrap();
        b.fit(frame().into(), targets()).unwrap();
        let query = Inputs::row(&["x", "noise"], &[5.0, 2.0]).unwrap();
        assert_eq!(a.predict(query.clone(), false).unwrap(), b.predict(query, false).unwrap());
    }

    #[test]
    fn learns_monotone_target() {
        let root = tempfile::tempdir().unwrap();
        let mut model = model(root.path(), 1);
        model.fit(frame().into(), targets()).unwrap();

        let low = model.predict(Inputs::row(&["noise", "x"], &[0.0, 1.0]).unwrap(), false).unwrap();
        let high = model.predict(Inputs::row(&["noise", "x"], &[0.0, 18.0]).unwrap(), false).unwrap();
        let (Prediction::Value(low), Prediction::Value(high)) = (low.single().unwrap(), high.single().unwrap()) else {
            panic!("regressors predict values");
        };
        assert!(low < high);
        assert_eq!(model.base().x_col(), Some(&["x".to_string(), "noise".to_string()][..]));
        assert!(model.base().classes().is_empty());
    }

    #[test]
    fn strategy_and_proba_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let options = ModelOptions::builder().models_root(root.path()).multiclass_strategy("ovr").build();
        assert!(matches!(ModelRfRegressor::with_defaults(&options), Err(ModelError::Configuration(_))));

        let mut model = model(root.path(), 3);
        model.fit(frame().into(), targets()).unwrap();
        let query = Frame::from_named(&["x", "noise"], array![[1.0, 1.0]]).unwrap();
        assert!(matches!(model.predict(query.into(), true), Err(ModelError::Capability(_))));
    }
}
