//! Tabular preprocessing persisted as `preprocess_pipeline.bin`.
//!
//! Features are always selected by column name, so a frame carrying the
//! expected columns in any order yields the same matrix.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::Frame;
use crate::error::{ModelError, ModelResult};

/// Per-column standardization `(x - mean) / std`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Constant columns get a unit scale.
    pub fn fit(x: ArrayView2<'_, f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let mu = column.sum() / n;
            let var = column.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(mu);
            scale.push(if std > 0.0 { std } else { 1.0 });
        }
        Self { mean, scale }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform(&self, mut x: Array2<f64>) -> Array2<f64> {
        for (j, mut column) in x.axis_iter_mut(Axis(1)).enumerate() {
            let (mu, sigma) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - mu) / sigma);
        }
        x
    }
}

/// Column selection plus optional scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessPipeline {
    /// Columns of the frame seen at fit time.
    columns_in: Vec<String>,
    /// Columns every input must provide, in feature order.
    mandatory_columns: Vec<String>,
    scaler: Option<StandardScaler>,
}

impl PreprocessPipeline {
    /// Select `columns` without any transformation.
    pub fn passthrough(columns: Vec<String>) -> Self {
        Self {
            columns_in: columns.clone(),
            mandatory_columns: columns,
            scaler: None,
        }
    }

    /// Fit on `frame`, keeping `x_col` (every column when `None`).
    pub fn fit(frame: &Frame, x_col: Option<&[String]>, standardize: bool) -> ModelResult<Self> {
        let mandatory_columns = match x_col {
            Some(columns) if columns.is_empty() => {
                return Err(ModelError::invalid_input("x_col must name at least one column"))
            }
            Some(columns) => columns.to_vec(),
            None => frame.columns().to_vec(),
        };
        let selected = frame.select(&mandatory_columns)?;
        Ok(Self {
            columns_in: frame.columns().to_vec(),
            scaler: standardize.then(|| StandardScaler::fit(selected.view())),
            mandatory_columns,
        })
    }

    pub fn columns_in(&self) -> &[String] {
        &self.columns_in
    }

    pub fn mandatory_columns(&self) -> &[String] {
        &self.mandatory_columns
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    /// Feature matrix `[n_rows, mandatory_columns.len()]`.
    pub fn transform(&self, frame: &Frame) -> ModelResult<Array2<f64>> {
        let selected = frame.select(&self.mandatory_columns)?;
        Ok(match &self.scaler {
            Some(scaler) => scaler.transform(selected),
            None => selected,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    fn frame() -> Frame {
        Frame::from_named(&["a", "b", "c"], array![[1.0, 10.0, 5.0], [3.0, 30.0, 5.0]]).unwrap()
    }

    #[test]
    fn selection_ignores_column_order() {
        let pipeline = PreprocessPipeline::fit(&frame(), Some(&["b".to_string(), "a".to_string()][..]), false).unwrap();
        let shuffled = Frame::from_named(&["c", "a", "b"], array![[5.0, 1.0, 10.0], [5.0, 3.0, 30.0]]).unwrap();
        assert_eq!(pipeline.transform(&frame()).unwrap(), pipeline.transform(&shuffled).unwrap());
        assert_eq!(pipeline.columns_in(), &["a", "b", "c"]);
        assert_eq!(pipeline.mandatory_columns(), &["b", "a"]);
    }

    #[test]
    fn missing_mandatory_column_is_invalid_input() {
        let pipeline = PreprocessPipeline::fit(&frame(), None, false).unwrap();
        let partial = Frame::from_named(&["a"], array![[1.0]]).unwrap();
        assert!(matches!(pipeline.transform(&partial), Err(ModelError::InvalidInput(_))));
    }

    #[test]
    fn scaler_centers_and_keeps_constant_columns() {
        let pipeline = PreprocessPipeline::fit(&frame(), None, true).unwrap();
        let out = pipeline.transform(&frame()).unwrap();
        assert_abs_diff_eq!(out, array![[-1.0, -1.0, 0.0], [1.0, 1.0, 0.0]], epsilon = 1e-12);
    }
}
