use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{BinaryLearner, MulticlassLearner};
use crate::error::{ModelError, ModelResult};
use crate::utils::normalize_rows;

/// One binary estimator per unordered class pair.
///
/// Each pair casts a vote for its winner. Summed pair confidences, squashed
/// into `[0, 1/3)`, break ties between equal vote counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneVsOne<B> {
    prototype: B,
    pairs: Vec<(usize, usize)>,
    estimators: Vec<B>,
    n_classes: usize,
}

impl<B: BinaryLearner> OneVsOne<B> {
    pub fn new(prototype: B) -> Self {
        Self {
            prototype,
            pairs: Vec::new(),
            estimators: Vec::new(),
            n_classes: 0,
        }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }
}

impl<B: BinaryLearner> MulticlassLearner for OneVsOne<B> {
    fn fit_multiclass(&mut self, x: ArrayView2<'_, f64>, y: &[usize], n_classes: usize) -> ModelResult<()> {
        if n_classes < 2 {
            return Err(ModelError::invalid_input("one-vs-one needs at least two classes"));
        }
        let mut pairs = Vec::with_capacity(n_classes * (n_classes - 1) / 2);
        let mut estimators = Vec::with_capacity(pairs.capacity());
        for first in 0..n_classes {
            for second in first + 1..n_classes {
                let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == first || y[i] == second).collect();
                let sub_x = x.select(Axis(0), &rows);
                let target: Vec<bool> = rows.iter().map(|&i| y[i] == second).collect();
                let mut estimator = self.prototype.clone();
                estimator.fit_binary(sub_x.view(), &target)?;
                pairs.push((first, second));
                estimators.push(estimator);
            }
        }
        self.pairs = pairs;
        self.estimators = estimators;
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let n = x.nrows();
        let mut votes = Array2::<f64>::zeros((n, self.n_classes));
        let mut confidence = Array2::<f64>::zeros((n, self.n_classes));
        for (&(first, second), estimator) in self.pairs.iter().zip(&self.estimators) {
            let p = estimator.predict_positive(x);
            for (i, &value) in p.iter().enumerate() {
                if value > 0.5 {
                    votes[[i, second]] += 1.0;
                } else {
                    votes[[i, first]] += 1.0;
                }
                confidence[[i, second]] += value;
                confidence[[i, first]] += 1.0 - value;
            }
        }
        let scores = votes + confidence.mapv(|c| c / (3.0 * (c.abs() + 1.0)));
        normalize_rows(scores)
    }
}
