//! Row-wise combination rules.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::registry::ModelRegistry;

type RowFn = dyn Fn(ArrayView1<'_, f64>) -> f64 + Send + Sync;

/// A named user-supplied rule.
///
/// Only the name is persisted; a reload looks the closure up in the
/// [`ModelRegistry`].
#[derive(Clone)]
pub struct CustomAggregation {
    name: String,
    function: Arc<RowFn>,
}

impl CustomAggregation {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(ArrayView1<'_, f64>) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            function: Arc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, row: ArrayView1<'_, f64>) -> f64 {
        (self.function)(row)
    }
}

impl fmt::Debug for CustomAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomAggregation").field("name", &self.name).finish_non_exhaustive()
    }
}

/// How member predictions are combined, one row at a time.
#[derive(Debug, Clone)]
pub enum AggregationFunction {
    Median,
    Mean,
    Custom(CustomAggregation),
}

impl AggregationFunction {
    pub fn name(&self) -> &str {
        match self {
            AggregationFunction::Median => "median_predict",
            AggregationFunction::Mean => "mean_predict",
            AggregationFunction::Custom(custom) => custom.name(),
        }
    }

    pub fn apply_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            AggregationFunction::Median => median(row),
            AggregationFunction::Mean => mean(row),
            AggregationFunction::Custom(custom) => custom.call(row),
        }
    }

    /// Combine `[n_samples, n_members]` into one value per sample.
    pub fn apply(&self, predictions: ArrayView2<'_, f64>) -> Array1<f64> {
        predictions.rows().into_iter().map(|row| self.apply_row(row)).collect()
    }

    pub(crate) fn record(&self) -> FunctionRecord {
        match self {
            AggregationFunction::Median => FunctionRecord::Median,
            AggregationFunction::Mean => FunctionRecord::Mean,
            AggregationFunction::Custom(custom) => FunctionRecord::Custom {
                name: custom.name().to_string(),
            },
        }
    }

    pub(crate) fn from_record(record: FunctionRecord, registry: &ModelRegistry) -> ModelResult<Self> {
        match record {
            FunctionRecord::Median => Ok(AggregationFunction::Median),
            FunctionRecord::Mean => Ok(AggregationFunction::Mean),
            FunctionRecord::Custom { name } => Self::resolve(&name, registry),
        }
    }

    /// A built-in name, or a custom function registered under `name`.
    pub fn resolve(name: &str, registry: &ModelRegistry) -> ModelResult<Self> {
        name.parse().or_else(|err| match registry.custom_function(name) {
            Some(custom) => Ok(AggregationFunction::Custom(custom.clone())),
            None => Err(err),
        })
    }
}

impl FromStr for AggregationFunction {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "median_predict" => Ok(AggregationFunction::Median),
            "mean_predict" => Ok(AggregationFunction::Mean),
            other => Err(ModelError::config(format!(
                "unknown aggregation function `{other}`, expected median_predict, mean_predict or a registered custom function"
            ))),
        }
    }
}

/// Persisted form of [`AggregationFunction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum FunctionRecord {
    Median,
    Mean,
    Custom { name: String },
}

/// Row median; the mean of the two middle values for even lengths.
pub fn median(row: ArrayView1<'_, f64>) -> f64 {
    let mut values = row.to_vec();
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

pub fn mean(row: ArrayView1<'_, f64>) -> f64 {
    if row.is_empty() {
        return f64::NAN;
    }
    row.sum() / row.len() as f64
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(array![1.0, 2.0, 9.0], 2.0)]
    #[case(array![4.0, 1.0, 3.0, 2.0], 2.5)]
    #[case(array![7.0], 7.0)]
    fn median_of_rows(#[case] row: Array1<f64>, #[case] expected: f64) {
        assert_abs_diff_eq!(median(row.view()), expected);
    }

    #[test]
    fn apply_is_row_wise() {
        let predictions = array![[2.0, 4.0], [1.0, 1.0]];
        let out = AggregationFunction::Mean.apply(predictions.view());
        assert_eq!(out, array![3.0, 1.0]);
    }

    #[test]
    fn names_resolve_through_registry() {
        let registry = ModelRegistry::default().with_function(CustomAggregation::new("max_predict", |row| {
            row.fold(f64::NEG_INFINITY, |a, &b| a.max(b))
        }));
        let function = AggregationFunction::resolve("max_predict", &registry).unwrap();
        assert_eq!(function.name(), "max_predict");
        assert_eq!(function.apply_row(array![1.0, 5.0, 2.0].view()), 5.0);
        assert!(matches!(
            AggregationFunction::resolve("toto", &registry),
            Err(ModelError::Configuration(_))
        ));
        assert!(matches!(
            AggregationFunction::from_record(FunctionRecord::Custom { name: "gone".into() }, &registry),
            Err(ModelError::Configuration(_))
        ));
    }

    proptest! {
        #[test]
        fn median_and_mean_stay_within_bounds(values in prop::collection::vec(-1e6f64..1e6, 1..20)) {
            let row = Array1::from(values.clone());
            let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            for value in [median(row.view()), mean(row.view())] {
                prop_assert!(value >= lo - 1e-6 && value <= hi + 1e-6);
            }
        }

        #[test]
        fn median_ignores_order(mut values in prop::collection::vec(-1e3f64..1e3, 1..20)) {
            let before = median(Array1::from(values.clone()).view());
            values.reverse();
            prop_assert_eq!(before, median(Array1::from(values).view()));
        }

        #[test]
        fn constant_rows_are_fixed_points(value in -1e3f64..1e3, n in 1usize..10) {
            let row = Array1::from_elem(n, value);
            prop_assert!((median(row.view()) - value).abs() < 1e-9);
            prop_assert!((mean(row.view()) - value).abs() < 1e-9);
        }
    }
}
