//! Random forest regressor.

use bon::Builder;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{MaxFeatures, RegressionTree, TreeParams};
use super::ParamValidationError;
use crate::error::{ModelError, ModelResult};
use crate::utils::Parallelism;

/// Forest hyper-parameters, persisted as `rf_confs`.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct ForestParams {
    /// Default: 100.
    #[builder(default = 100)]
    pub n_estimators: usize,

    /// Unlimited when `None`.
    pub max_depth: Option<usize>,

    /// Default: 1.
    #[builder(default = 1)]
    pub min_samples_leaf: usize,

    /// Features tried per split. Default: all.
    #[builder(default)]
    pub max_features: MaxFeatures,

    /// Draw each tree's rows with replacement. Default: true.
    #[builder(default = true)]
    pub bootstrap: bool,

    /// Thread count (0 = auto, 1 = sequential).
    #[builder(default)]
    #[serde(default)]
    pub n_threads: usize,
}

impl<S: forest_params_builder::IsComplete> ForestParamsBuilder<S> {
    pub fn build(self) -> Result<ForestParams, ParamValidationError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if self.n_estimators == 0 {
            return Err(ParamValidationError::InvalidNEstimators);
        }
        if self.max_depth == Some(0) {
            return Err(ParamValidationError::InvalidMaxDepth);
        }
        if self.min_samples_leaf == 0 {
            return Err(ParamValidationError::InvalidMinSamplesLeaf);
        }
        self.max_features.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Fit the forest. Tree seeds are drawn from `seed`, so results do not
    /// depend on the thread count.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, seed: u64) -> ModelResult<()> {
        let n = y.len();
        if x.nrows() != n || n == 0 {
            return Err(ModelError::invalid_input(format!("{} feature rows for {} targets", x.nrows(), n)));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::invalid_input("regression targets must be finite"));
        }

        let grad: Vec<f64> = y.iter().map(|v| -v).collect();
        let hess = vec![1.0; n];
        let tree_params = TreeParams {
            max_depth: self.params.max_depth.unwrap_or(usize::MAX),
            min_samples_leaf: self.params.min_samples_leaf,
            lambda: 0.0,
            max_features: self.params.max_features,
        };
        let bootstrap = self.params.bootstrap;

        let mut master = Xoshiro256PlusPlus::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..self.params.n_estimators).map(|_| master.gen()).collect();

        let trees = Parallelism::from_threads(self.params.n_threads).maybe_par_map(seeds, |tree_seed| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(tree_seed);
            let rows: Vec<usize> = if bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            RegressionTree::grow(x, &grad, &hess, rows, &tree_params, &mut rng)
        });
        debug!(n_trees = trees.len(), n_rows = n, "random forest fitted");
        self.trees = trees;
        Ok(())
    }

    /// Mean of the tree predictions.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let mut total = Array1::zeros(x.nrows());
        if self.trees.is_empty() {
            return total;
        }
        for tree in &self.trees {
            total += &tree.predict(x);
        }
        total / self.trees.len() as f64
    }
}
