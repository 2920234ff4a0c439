//! Named-column numeric table.

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{ModelError, ModelResult};

/// Dense `f64` table with named columns, rows are samples.
///
/// Tabular backends address features by column name, so two frames holding
/// the same named columns in a different order produce identical features.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Frame {
    /// Build a frame, checking the column count and name uniqueness.
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> ModelResult<Self> {
        if columns.len() != values.ncols() {
            return Err(ModelError::invalid_input(format!(
                "{} column names for {} columns",
                columns.len(),
                values.ncols()
            )));
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(ModelError::invalid_input(format!("duplicated column `{name}`")));
            }
        }
        Ok(Self { columns, values })
    }

    /// Build a frame from `&str` column names.
    pub fn from_named(columns: &[&str], values: Array2<f64>) -> ModelResult<Self> {
        Self::new(columns.iter().map(|c| c.to_string()).collect(), values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Copy the named columns, in the requested order.
    pub fn select(&self, names: &[String]) -> ModelResult<Array2<f64>> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| ModelError::invalid_input(format!("missing column `{name}`")))
            })
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(self.values.select(Axis(1), &indices))
    }

    /// Single-column view by name.
    pub fn column(&self, name: &str) -> ModelResult<ndarray::ArrayView1<'_, f64>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| ModelError::invalid_input(format!("missing column `{name}`")))?;
        Ok(self.values.column(index))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn select_reorders_by_name() {
        let frame = Frame::from_named(&["a", "b", "c"], array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        let picked = frame.select(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(picked, array![[3.0, 1.0], [6.0, 4.0]]);
    }

    #[test]
    fn missing_column_is_invalid_input() {
        let frame = Frame::from_named(&["a"], array![[1.0]]).unwrap();
        assert!(matches!(frame.select(&["b".to_string()]), Err(ModelError::InvalidInput(_))));
    }

    #[test]
    fn rejects_mismatched_or_duplicated_columns() {
        assert!(Frame::from_named(&["a"], array![[1.0, 2.0]]).is_err());
        assert!(Frame::from_named(&["a", "a"], array![[1.0, 2.0]]).is_err());
    }
}
