//! Linear models trained with elastic-net coordinate descent.
//!
//! Each pass updates the bias, then every feature weight in turn:
//!
//! ```text
//! grad_l2 = Σ(gradient × feature) + lambda × w
//! hess_l2 = Σ(hessian × feature²) + lambda
//! delta   = soft_threshold(-grad_l2 / hess_l2, alpha / hess_l2) × learning_rate
//! ```

use bon::Builder;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::ParamValidationError;
use crate::error::{ModelError, ModelResult};
use crate::strategy::BinaryLearner;
use crate::utils::sigmoid;

const MIN_HESSIAN: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearLoss {
    /// Binary cross-entropy on 0/1 targets.
    #[default]
    Logistic,
    /// Squared error.
    Squared,
}

impl LinearLoss {
    #[inline]
    fn grad_hess(self, margin: f64, target: f64) -> (f64, f64) {
        match self {
            LinearLoss::Logistic => {
                let p = sigmoid(margin);
                (p - target, (p * (1.0 - p)).max(MIN_HESSIAN))
            }
            LinearLoss::Squared => (margin - target, 1.0),
        }
    }
}

/// Coordinate descent parameters, persisted as `linear_confs`.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct LinearParams {
    /// Maximum passes over the features. Default: 100.
    #[builder(default = 100)]
    pub max_iter: usize,

    /// L2 regularization. Default: 1.0.
    #[builder(default = 1.0)]
    pub lambda: f64,

    /// L1 regularization. Default: 0.0.
    #[builder(default = 0.0)]
    pub alpha: f64,

    /// Default: 1.0.
    #[builder(default = 1.0)]
    pub learning_rate: f64,

    /// Stop once the largest weight change of a pass is below this.
    #[builder(default = 1e-6)]
    pub tol: f64,
}

impl<S: linear_params_builder::IsComplete> LinearParamsBuilder<S> {
    pub fn build(self) -> Result<LinearParams, ParamValidationError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl Default for LinearParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl LinearParams {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        if self.max_iter == 0 {
            return Err(ParamValidationError::InvalidMaxIter);
        }
        if !(self.lambda >= 0.0) {
            return Err(ParamValidationError::InvalidLambda(self.lambda));
        }
        if !(self.alpha >= 0.0) {
            return Err(ParamValidationError::InvalidAlpha(self.alpha));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ParamValidationError::InvalidLearningRate(self.learning_rate));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    params: LinearParams,
    loss: LinearLoss,
    weights: Array1<f64>,
    bias: f64,
}

impl LinearModel {
    pub fn new(params: LinearParams, loss: LinearLoss) -> Self {
        Self {
            params,
            loss,
            weights: Array1::zeros(0),
            bias: 0.0,
        }
    }

    pub fn logistic(params: LinearParams) -> Self {
        Self::new(params, LinearLoss::Logistic)
    }

    pub fn squared(params: LinearParams) -> Self {
        Self::new(params, LinearLoss::Squared)
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> ModelResult<()> {
        let (n, d) = x.dim();
        if n != y.len() || n == 0 {
            return Err(ModelError::invalid_input(format!("{n} feature rows for {} targets", y.len())));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::invalid_input("targets must be finite"));
        }

        let params = &self.params;
        let mean = y.sum() / n as f64;
        let mut bias = match self.loss {
            LinearLoss::Squared => mean,
            LinearLoss::Logistic => {
                let p = mean.clamp(1e-6, 1.0 - 1e-6);
                (p / (1.0 - p)).ln()
            }
        };
        let mut weights = Array1::<f64>::zeros(d);
        let mut margins = Array1::from_elem(n, bias);

        for _ in 0..params.max_iter {
            let mut max_delta = 0.0f64;

            let (sum_grad, sum_hess) = margins
                .iter()
                .zip(y.iter())
                .map(|(&m, &t)| self.loss.grad_hess(m, t))
                .fold((0.0, 0.0), |(g, h), (gi, hi)| (g + gi, h + hi));
            if sum_hess > 0.0 {
                let delta = -sum_grad / sum_hess * params.learning_rate;
                bias += delta;
                margins.mapv_inplace(|m| m + delta);
                max_delta = max_delta.max(delta.abs());
            }

            for j in 0..d {
                let column = x.column(j);
                let (mut sum_grad, mut sum_hess) = (0.0, 0.0);
                for (i, &value) in column.iter().enumerate() {
                    if value == 0.0 {
                        continue;
                    }
                    let (g, h) = self.loss.grad_hess(margins[i], y[i]);
                    sum_grad += g * value;
                    sum_hess += h * value * value;
                }
                let delta = weight_update(weights[j], sum_grad, sum_hess, params);
                if delta != 0.0 {
                    weights[j] += delta;
                    margins.scaled_add(delta, &column);
                    max_delta = max_delta.max(delta.abs());
                }
            }

            if max_delta < params.tol {
                break;
            }
        }

        self.weights = weights;
        self.bias = bias;
        Ok(())
    }

    /// Raw linear scores `x·w + b`.
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        if self.weights.len() != x.ncols() {
            return Array1::from_elem(x.nrows(), self.bias);
        }
        x.dot(&self.weights) + self.bias
    }

    /// Predicted values (squared loss) or positive probabilities (logistic loss).
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let scores = self.decision_function(x);
        match self.loss {
            LinearLoss::Logistic => scores.mapv(sigmoid),
            LinearLoss::Squared => scores,
        }
    }
}

fn weight_update(current: f64, sum_grad: f64, sum_hess: f64, params: &LinearParams) -> f64 {
    let grad_l2 = sum_grad + params.lambda * current;
    let hess_l2 = sum_hess + params.lambda;
    if hess_l2.abs() < 1e-10 {
        return 0.0;
    }
    let raw = -grad_l2 / hess_l2;
    soft_threshold(raw, params.alpha / hess_l2) * params.learning_rate
}

/// S(x, λ) = sign(x) × max(|x| - λ, 0)
#[inline]
fn soft_threshold(x: f64, threshold: f64) -> f64 {
    if x > threshold {
        x - threshold
    } else if x < -threshold {
        x + threshold
    } else {
        0.0
    }
}

impl BinaryLearner for LinearModel {
    fn fit_binary(&mut self, x: ArrayView2<'_, f64>, y: &[bool]) -> ModelResult<()> {
        let targets: Array1<f64> = y.iter().map(|&positive| if positive { 1.0 } else { 0.0 }).collect();
        self.fit(x, targets.view())
    }

    fn predict_positive(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        match self.loss {
            LinearLoss::Logistic => self.predict(x),
            LinearLoss::Squared => self.predict(x).mapv(|v| v.clamp(0.0, 1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::rstest;

    use super::*;

    #[test]
    fn squared_loss_recovers_line() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 3.0, 5.0, 7.0, 9.0];
        let params = LinearParams::builder().lambda(0.0).max_iter(500).build().unwrap();
        let mut model = LinearModel::squared(params);
        model.fit(x.view(), y.view()).unwrap();

        assert_abs_diff_eq!(model.weights()[0], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(model.bias(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn logistic_separates_classes() {
        let x = array![[-2.0], [-1.0], [1.0], [2.0]];
        let mut model = LinearModel::logistic(LinearParams::default());
        model.fit_binary(x.view(), &[false, false, true, true]).unwrap();

        let p = model.predict_positive(x.view());
        assert!(p[0] < 0.5 && p[1] < 0.5);
        assert!(p[2] > 0.5 && p[3] > 0.5);
    }

    #[rstest]
    #[case(5.0, 1.0, 4.0)]
    #[case(-5.0, 1.0, -4.0)]
    #[case(0.5, 1.0, 0.0)]
    fn soft_threshold_cases(#[case] x: f64, #[case] threshold: f64, #[case] expected: f64) {
        assert_abs_diff_eq!(soft_threshold(x, threshold), expected);
    }

    #[test]
    fn strong_l1_zeroes_weights() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.1, 0.2];
        let params = LinearParams::builder().alpha(100.0).build().unwrap();
        let mut model = LinearModel::squared(params);
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.weights()[0], 0.0);
    }
}
