use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{BinaryLearner, MulticlassLearner};
use crate::error::{ModelError, ModelResult};
use crate::utils::normalize_rows;

/// One binary estimator per class against all the others.
///
/// Two classes need a single estimator for the second class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneVsRest<B> {
    prototype: B,
    estimators: Vec<B>,
    n_classes: usize,
}

impl<B: BinaryLearner> OneVsRest<B> {
    pub fn new(prototype: B) -> Self {
        Self {
            prototype,
            estimators: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn estimators(&self) -> &[B] {
        &self.estimators
    }
}

impl<B: BinaryLearner> MulticlassLearner for OneVsRest<B> {
    fn fit_multiclass(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> ModelResult<()> {
        if n_classes < 2 {
            return Err(ModelError::invalid_input("one-vs-rest needs at least two classes"));
        }
        let positives: Vec<usize> = if n_classes == 2 { vec![1] } else { (0..n_classes).collect() };
        let estimators = positives
            .into_iter()
            .map(|class| {
                let mut estimator = self.prototype.clone();
                let target: Vec<bool> = y.iter().map(|&c| c == class).collect();
                estimator.fit_binary(x, &target)?;
                Ok(estimator)
            })
            .collect::<ModelResult<Vec<_>>>()?;

        self.estimators = estimators;
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let n = x.nrows();
        let mut scores = Array2::zeros((n, self.n_classes));
        if self.n_classes == 2 {
            let p = self.estimators[0].predict_positive(x);
            for (i, &value) in p.iter().enumerate() {
                scores[[i, 0]] = 1.0 - value;
                scores[[i, 1]] = value;
            }
            return scores;
        }
        for (k, estimator) in self.estimators.iter().enumerate() {
            scores.column_mut(k).assign(&estimator.predict_positive(x));
        }
        normalize_rows(scores)
    }
}
