//! Prediction containers.

use ndarray::{Array1, Array2, Axis};

use super::Label;
use crate::error::{ModelError, ModelResult};

/// Batch-shaped predictions.
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    /// One label per sample.
    Labels(Vec<Label>),
    /// Indicator matrix `[n_samples, n_labels]`.
    MultiLabel(Array2<u8>),
    /// Probability matrix `[n_samples, n_classes]`, columns in class order.
    Probas(Array2<f64>),
    /// One value per sample.
    Values(Array1<f64>),
}

/// Prediction for a single sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Label(Label),
    MultiLabel(Array1<u8>),
    Probas(Array1<f64>),
    Value(f64),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Labels(labels) => labels.len(),
            Predictions::MultiLabel(values) => values.nrows(),
            Predictions::Probas(values) => values.nrows(),
            Predictions::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unwrap a one-row batch.
    pub fn into_single(self) -> ModelResult<Prediction> {
        if self.len() != 1 {
            return Err(ModelError::invalid_input(format!(
                "expected exactly one prediction, got {}",
                self.len()
            )));
        }
        Ok(match self {
            Predictions::Labels(mut labels) => Prediction::Label(labels.remove(0)),
            Predictions::MultiLabel(values) => Prediction::MultiLabel(values.index_axis_move(Axis(0), 0)),
            Predictions::Probas(values) => Prediction::Probas(values.index_axis_move(Axis(0), 0)),
            Predictions::Values(values) => Prediction::Value(values[0]),
        })
    }

    pub fn labels(&self) -> Option<&[Label]> {
        match self {
            Predictions::Labels(labels) => Some(labels),
            _ => None,
        }
    }

    pub fn probas(&self) -> Option<&Array2<f64>> {
        match self {
            Predictions::Probas(values) => Some(values),
            _ => None,
        }
    }

    pub fn indicators(&self) -> Option<&Array2<u8>> {
        match self {
            Predictions::MultiLabel(values) => Some(values),
            _ => None,
        }
    }

    pub fn values(&self) -> Option<&Array1<f64>> {
        match self {
            Predictions::Values(values) => Some(values),
            _ => None,
        }
    }
}

/// Result of [`Model::predict`](crate::model::Model::predict).
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Single(Prediction),
    Batch(Predictions),
}

impl Output {
    pub fn single(&self) -> Option<&Prediction> {
        match self {
            Output::Single(prediction) => Some(prediction),
            Output::Batch(_) => None,
        }
    }

    pub fn batch(&self) -> Option<&Predictions> {
        match self {
            Output::Batch(predictions) => Some(predictions),
            Output::Single(_) => None,
        }
    }

    pub fn into_batch(self) -> Option<Predictions> {
        match self {
            Output::Batch(predictions) => Some(predictions),
            Output::Single(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn single_row_unwraps() {
        let probas = Predictions::Probas(array![[0.2, 0.8]]);
        assert_eq!(probas.into_single().unwrap(), Prediction::Probas(array![0.2, 0.8]));

        let labels = Predictions::Labels(vec![Label::from("a")]);
        assert_eq!(labels.into_single().unwrap(), Prediction::Label(Label::from("a")));
    }

    #[test]
    fn multi_row_does_not_unwrap() {
        let values = Predictions::Values(array![1.0, 2.0]);
        assert!(values.into_single().is_err());
    }
}
