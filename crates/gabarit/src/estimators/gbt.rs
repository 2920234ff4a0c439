//! Gradient boosted trees for classification.
//!
//! Two classes use a single logistic output; more classes use one softmax
//! output per class, each round growing one tree per output.

use bon::Builder;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::tree::{MaxFeatures, RegressionTree, TreeParams};
use super::ParamValidationError;
use crate::error::{ModelError, ModelResult};
use crate::strategy::{BinaryLearner, MulticlassLearner};
use crate::utils::sigmoid;

const PROBA_EPS: f64 = 1e-7;
const MIN_HESSIAN: f64 = 1e-6;

// =============================================================================
// GbtParams
// =============================================================================

/// Boosting hyper-parameters, persisted as `gbt_confs`.
///
/// # Example
///
/// ```
/// use gabarit::estimators::GbtParams;
///
/// let params = GbtParams::builder().n_estimators(50).max_depth(2).build().unwrap();
/// assert_eq!(params.learning_rate, 0.1);
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct GbtParams {
    /// Boosting rounds. Default: 100.
    #[builder(default = 100)]
    pub n_estimators: usize,

    /// Shrinkage applied to each tree. Default: 0.1.
    #[builder(default = 0.1)]
    pub learning_rate: f64,

    /// Default: 3.
    #[builder(default = 3)]
    pub max_depth: usize,

    /// Default: 1.
    #[builder(default = 1)]
    pub min_samples_leaf: usize,

    /// L2 regularization on leaf weights. Default: 1.0.
    #[builder(default = 1.0)]
    pub lambda: f64,
}

impl<S: gbt_params_builder::IsComplete> GbtParamsBuilder<S> {
    /// Build and validate the parameters.
    pub fn build(self) -> Result<GbtParams, ParamValidationError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl Default for GbtParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl GbtParams {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if self.n_estimators == 0 {
            return Err(ParamValidationError::InvalidNEstimators);
        }
        if !(self.learning_rate > 0.0) {
            return Err(ParamValidationError::InvalidLearningRate(self.learning_rate));
        }
        if self.max_depth == 0 {
            return Err(ParamValidationError::InvalidMaxDepth);
        }
        if self.min_samples_leaf == 0 {
            return Err(ParamValidationError::InvalidMinSamplesLeaf);
        }
        if !(self.lambda >= 0.0) {
            return Err(ParamValidationError::InvalidLambda(self.lambda));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            lambda: self.lambda,
            max_features: MaxFeatures::All,
        }
    }
}

// =============================================================================
// GradientBoosting
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: GbtParams,
    n_classes: usize,
    base_scores: Vec<f64>,
    /// `rounds[r][k]` is the tree of output `k` at round `r`.
    rounds: Vec<Vec<RegressionTree>>,
}

impl GradientBoosting {
    pub fn new(params: GbtParams) -> Self {
        Self {
            params,
            n_classes: 0,
            base_scores: Vec::new(),
            rounds: Vec::new(),
        }
    }

    pub fn params(&self) -> &GbtParams {
        &self.params
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    fn n_outputs(n_classes: usize) -> usize {
        if n_classes <= 2 {
            1
        } else {
            n_classes
        }
    }

    /// Fit on class indices in `0..n_classes`.
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> ModelResult<()> {
        if n_classes < 2 {
            return Err(ModelError::invalid_input("gradient boosting needs at least two classes"));
        }
        if x.nrows() != y.len() || y.is_empty() {
            return Err(ModelError::invalid_input(format!(
                "{} feature rows for {} targets",
                x.nrows(),
                y.len()
            )));
        }

        let n = y.len();
        let n_outputs = Self::n_outputs(n_classes);
        let mut counts = vec![0.0f64; n_classes];
        for &class in y {
            counts[class] += 1.0;
        }
        let base_scores: Vec<f64> = if n_outputs == 1 {
            let p = (counts[1] / n as f64).clamp(PROBA_EPS, 1.0 - PROBA_EPS);
            vec![(p / (1.0 - p)).ln()]
        } else {
            counts.iter().map(|&c| (c / n as f64).max(PROBA_EPS).ln()).collect()
        };

        let tree_params = self.params.tree_params();
        let learning_rate = self.params.learning_rate;
        let rows: Vec<usize> = (0..n).collect();
        // Splits consider all features, so the generator is never drawn from.
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let mut margins = Array2::from_shape_fn((n, n_outputs), |(_, k)| base_scores[k]);
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut rounds = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            let probas = output_probabilities(&margins);
            let mut round = Vec::with_capacity(n_outputs);
            for k in 0..n_outputs {
                for i in 0..n {
                    let positive = if n_outputs == 1 { y[i] == 1 } else { y[i] == k };
                    let p = probas[[i, k]];
                    grad[i] = p - if positive { 1.0 } else { 0.0 };
                    hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
                }
                let tree = RegressionTree::grow(x, &grad, &hess, rows.clone(), &tree_params, &mut rng);
                for i in 0..n {
                    margins[[i, k]] += learning_rate * tree.predict_row(x.row(i));
                }
                round.push(tree);
            }
            rounds.push(round);
        }

        self.n_classes = n_classes;
        self.base_scores = base_scores;
        self.rounds = rounds;
        Ok(())
    }

    fn margins(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let n_outputs = self.base_scores.len();
        let mut margins = Array2::from_shape_fn((x.nrows(), n_outputs), |(_, k)| self.base_scores[k]);
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                let contribution = tree.predict(x);
                margins
                    .column_mut(k)
                    .scaled_add(self.params.learning_rate, &contribution);
            }
        }
        margins
    }

    /// Class probabilities `[n_samples, n_classes]`.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let probas = output_probabilities(&self.margins(x));
        if self.base_scores.len() == 1 {
            let mut two = Array2::zeros((x.nrows(), 2));
            for (i, &p) in probas.column(0).iter().enumerate() {
                two[[i, 0]] = 1.0 - p;
                two[[i, 1]] = p;
            }
            two
        } else {
            probas
        }
    }
}

/// Logistic for a single output, row-wise softmax otherwise.
fn output_probabilities(margins: &Array2<f64>) -> Array2<f64> {
    if margins.ncols() == 1 {
        return margins.mapv(sigmoid);
    }
    let mut probas = margins.clone();
    for mut row in probas.axis_iter_mut(Axis(0)) {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row.mapv_inplace(|v| v / total);
    }
    probas
}

impl MulticlassLearner for GradientBoosting {
    fn fit_multiclass(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> ModelResult<()> {
        self.fit(x, y, n_classes)
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        GradientBoosting::predict_proba(self, x)
    }
}

impl BinaryLearner for GradientBoosting {
    fn fit_binary(&mut self, x: ArrayView2<'_, f64>, y: &[bool]) -> ModelResult<()> {
        let classes: Vec<usize> = y.iter().map(|&positive| usize::from(positive)).collect();
        self.fit(x, &classes, 2)
    }

    fn predict_positive(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        GradientBoosting::predict_proba(self, x).column(1).to_owned()
    }
}
