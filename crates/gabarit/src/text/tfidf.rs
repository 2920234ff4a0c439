//! TF-IDF weighting.

use bon::Builder;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use super::{csr_from_rows, super_documents, CountParams, CountVectorizer};
use crate::error::{ModelError, ModelResult};
use crate::estimators::ParamValidationError;

/// Row normalization applied after weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    #[default]
    L2,
    None,
}

/// Weighting parameters, persisted as `tfidf_confs`.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct TransformerParams {
    #[builder(default)]
    pub norm: Norm,

    #[builder(default = true)]
    pub use_idf: bool,

    /// Add one to document frequencies, as if an extra document held every term.
    #[builder(default = true)]
    pub smooth_idf: bool,

    /// Replace `tf` with `1 + ln(tf)`.
    #[builder(default)]
    pub sublinear_tf: bool,
}

impl Default for TransformerParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Counting plus weighting parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TfidfParams {
    pub count: CountParams,
    pub transformer: TransformerParams,
}

impl TfidfParams {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        self.count.validate()
    }
}

// =============================================================================
// TfidfTransformer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfTransformer {
    params: TransformerParams,
    idf: Vec<f64>,
}

impl TfidfTransformer {
    pub fn new(params: TransformerParams) -> Self {
        Self { params, idf: Vec::new() }
    }

    pub fn params(&self) -> &TransformerParams {
        &self.params
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Learn inverse document frequencies from a count matrix.
    pub fn fit(&mut self, counts: &CsMat<f64>) {
        let n_documents = counts.rows() as f64;
        let mut document_frequency = vec![0usize; counts.cols()];
        for row in counts.outer_iterator() {
            for (j, &value) in row.iter() {
                if value != 0.0 {
                    document_frequency[j] += 1;
                }
            }
        }
        let smooth = if self.params.smooth_idf { 1.0 } else { 0.0 };
        self.idf = document_frequency
            .into_iter()
            .map(|df| ((n_documents + smooth) / (df as f64 + smooth)).ln() + 1.0)
            .collect();
    }

    pub fn transform(&self, counts: &CsMat<f64>) -> ModelResult<CsMat<f64>> {
        if self.params.use_idf && self.idf.len() != counts.cols() {
            return Err(ModelError::invalid_input(format!(
                "tf-idf fitted on {} features, got {}",
                self.idf.len(),
                counts.cols()
            )));
        }
        let rows = counts
            .outer_iterator()
            .map(|row| {
                let mut weighted: Vec<(usize, f64)> = row
                    .iter()
                    .map(|(j, &tf)| {
                        let tf = if self.params.sublinear_tf && tf > 0.0 { 1.0 + tf.ln() } else { tf };
                        let idf = if self.params.use_idf { self.idf[j] } else { 1.0 };
                        (j, tf * idf)
                    })
                    .collect();
                let scale = match self.params.norm {
                    Norm::L1 => weighted.iter().map(|(_, v)| v.abs()).sum::<f64>(),
                    Norm::L2 => weighted.iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
                    Norm::None => 1.0,
                };
                if scale > 0.0 {
                    weighted.iter_mut().for_each(|(_, v)| *v /= scale);
                }
                weighted
            })
            .collect();
        csr_from_rows(counts.cols(), rows)
    }
}

// =============================================================================
// TfidfVectorizer
// =============================================================================

/// [`CountVectorizer`] followed by [`TfidfTransformer`].
///
/// # Example
///
/// ```
/// use gabarit::text::{TfidfParams, TfidfVectorizer};
///
/// let docs: Vec<String> = vec!["red apple".into(), "green apple".into()];
/// let mut vectorizer = TfidfVectorizer::new(TfidfParams::default());
/// let features = vectorizer.fit_transform(&docs).unwrap();
/// assert_eq!(features.shape(), (2, 3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    count: CountVectorizer,
    transformer: TfidfTransformer,
}

impl TfidfVectorizer {
    pub fn new(params: TfidfParams) -> Self {
        Self {
            count: CountVectorizer::new(params.count),
            transformer: TfidfTransformer::new(params.transformer),
        }
    }

    pub fn params(&self) -> TfidfParams {
        TfidfParams {
            count: self.count.params().clone(),
            transformer: self.transformer.params().clone(),
        }
    }

    pub fn count(&self) -> &CountVectorizer {
        &self.count
    }

    pub fn transformer(&self) -> &TfidfTransformer {
        &self.transformer
    }

    pub fn n_features(&self) -> usize {
        self.count.n_features()
    }

    pub fn fit(&mut self, documents: &[String]) -> ModelResult<()> {
        let counts = self.count.fit_transform(documents)?;
        self.transformer.fit(&counts);
        Ok(())
    }

    pub fn transform(&self, documents: &[String]) -> ModelResult<CsMat<f64>> {
        self.transformer.transform(&self.count.transform(documents)?)
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> ModelResult<CsMat<f64>> {
        let counts = self.count.fit_transform(documents)?;
        self.transformer.fit(&counts);
        self.transformer.transform(&counts)
    }

    /// Fit on one concatenated document per class and return their
    /// features, `[n_classes, n_features]`.
    pub fn fit_super_documents(
        &mut self,
        documents: &[String],
        classes: &[usize],
        n_classes: usize,
    ) -> ModelResult<CsMat<f64>> {
        self.fit_transform(&super_documents(documents, classes, n_classes))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;

    use super::*;
    use crate::text::to_dense;

    fn docs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn smooth_idf_matches_formula() {
        let mut vectorizer = TfidfVectorizer::new(TfidfParams::default());
        vectorizer.fit(&docs(&["apple banana", "apple cherry", "apple"])).unwrap();
        let idf = vectorizer.transformer().idf();
        // apple in 3/3 docs, banana and cherry in 1/3
        assert_abs_diff_eq!(idf[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(idf[1], (4.0f64 / 2.0).ln() + 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rows_are_l2_normalized() {
        let mut vectorizer = TfidfVectorizer::new(TfidfParams::default());
        let features = to_dense(&vectorizer.fit_transform(&docs(&["red apple pie", "green apple"])).unwrap());
        for row in features.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn l1_and_sublinear() {
        let params = TfidfParams {
            transformer: TransformerParams::builder()
                .norm(Norm::L1)
                .use_idf(false)
                .sublinear_tf(true)
                .build(),
            ..TfidfParams::default()
        };
        let mut vectorizer = TfidfVectorizer::new(params);
        let features = to_dense(&vectorizer.fit_transform(&docs(&["aa aa aa aa bb"])).unwrap());
        let aa = 1.0 + 4.0f64.ln();
        assert_abs_diff_eq!(features[[0, 0]], aa / (aa + 1.0), epsilon = 1e-12);
        assert_abs_diff_eq!(features.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn unseen_documents_give_zero_rows() {
        let mut vectorizer = TfidfVectorizer::new(TfidfParams::default());
        vectorizer.fit(&docs(&["alpha beta"])).unwrap();
        let features = vectorizer.transform(&docs(&["gamma delta"])).unwrap();
        assert_eq!(features.nnz(), 0);
    }

    #[test]
    fn super_documents_have_one_row_per_class() {
        let mut vectorizer = TfidfVectorizer::new(TfidfParams::default());
        let features = vectorizer
            .fit_super_documents(&docs(&["hot sun", "cold snow", "hot sand"]), &[0, 1, 0], 2)
            .unwrap();
        assert_eq!(features.rows(), 2);
        assert_eq!(vectorizer.n_features(), 5);
    }
}
