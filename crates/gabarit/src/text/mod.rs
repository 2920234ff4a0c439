//! Text featurization for the TF-IDF backends.
//!
//! [`CountVectorizer`] turns documents into sparse term counts,
//! [`TfidfTransformer`] reweights them, and [`TfidfVectorizer`] chains both.
//! Matrices are `sprs` CSR with one row per document and columns in
//! vocabulary order.

mod count;
mod tfidf;

use ndarray::Array2;
use sprs::CsMat;

pub use count::{Analyzer, CountParams, CountVectorizer, DEFAULT_TOKEN_PATTERN};
pub use tfidf::{Norm, TfidfParams, TfidfTransformer, TfidfVectorizer, TransformerParams};

use crate::error::{ModelError, ModelResult};

/// Concatenate the documents of each class into one document per class.
///
/// Row `k` of the result holds every document whose class index is `k`,
/// joined by a space.
pub fn super_documents(texts: &[String], classes: &[usize], n_classes: usize) -> Vec<String> {
    let mut grouped: Vec<Vec<&str>> = vec![Vec::new(); n_classes];
    for (text, &class) in texts.iter().zip(classes) {
        if let Some(group) = grouped.get_mut(class) {
            group.push(text);
        }
    }
    grouped.into_iter().map(|group| group.join(" ")).collect()
}

/// Densify a CSR matrix.
pub fn to_dense(matrix: &CsMat<f64>) -> Array2<f64> {
    let mut dense = Array2::zeros((matrix.rows(), matrix.cols()));
    for (i, row) in matrix.outer_iterator().enumerate() {
        for (j, &value) in row.iter() {
            dense[[i, j]] = value;
        }
    }
    dense
}

/// Build a CSR matrix from per-row `(column, value)` entries sorted by column.
pub(crate) fn csr_from_rows(n_cols: usize, rows: Vec<Vec<(usize, f64)>>) -> ModelResult<CsMat<f64>> {
    let n_rows = rows.len();
    let nnz = rows.iter().map(Vec::len).sum();
    let mut indptr = Vec::with_capacity(n_rows + 1);
    let mut indices = Vec::with_capacity(nnz);
    let mut data = Vec::with_capacity(nnz);
    indptr.push(0);
    for row in rows {
        for (j, value) in row {
            indices.push(j);
            data.push(value);
        }
        indptr.push(indices.len());
    }
    CsMat::try_new((n_rows, n_cols), indptr, indices, data)
        .map_err(|(_, _, _, e)| ModelError::invalid_input(format!("malformed sparse matrix: {e:?}")))
}
