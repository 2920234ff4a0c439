//! Term counting.

use std::collections::BTreeMap;

use bon::Builder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use tracing::debug;

use super::csr_from_rows;
use crate::error::{ModelError, ModelResult};
use crate::estimators::ParamValidationError;

/// Words of two or more word characters.
pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// Unit of n-grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    /// N-grams of tokens matched by `token_pattern`.
    #[default]
    Word,
    /// N-grams of characters, whitespace collapsed.
    Char,
}

// =============================================================================
// CountParams
// =============================================================================

/// Count vectorizer parameters, persisted as `tfidf_count_confs`.
///
/// # Example
///
/// ```
/// use gabarit::text::CountParams;
///
/// let params = CountParams::builder().ngram_range((1, 2)).min_df(2).build().unwrap();
/// assert!(params.lowercase);
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct CountParams {
    /// Default: true.
    #[builder(default = true)]
    pub lowercase: bool,

    #[builder(default)]
    pub analyzer: Analyzer,

    /// Inclusive `(min_n, max_n)`. Default: `(1, 1)`.
    #[builder(default = (1, 1))]
    pub ngram_range: (usize, usize),

    /// Minimum number of documents a term must appear in. Default: 1.
    #[builder(default = 1)]
    pub min_df: usize,

    /// Keep only the most frequent terms.
    pub max_features: Option<usize>,

    /// Clip counts to 1.
    #[builder(default)]
    pub binary: bool,

    #[builder(into, default = DEFAULT_TOKEN_PATTERN.to_string())]
    pub token_pattern: String,
}

impl<S: count_params_builder::IsComplete> CountParamsBuilder<S> {
    pub fn build(self) -> Result<CountParams, ParamValidationError> {
        let params = self.__build_internal();
        params.validate()?;
        Ok(params)
    }
}

impl Default for CountParams {
    fn default() -> Self {
        Self::builder().__build_internal()
    }
}

impl CountParams {
    pub fn validate(&self) -> Result<(), ParamValidationError> {
        let (min, max) = self.ngram_range;
        if min == 0 || min > max {
            return Err(ParamValidationError::InvalidNgramRange { min, max });
        }
        if self.min_df == 0 {
            return Err(ParamValidationError::InvalidMinDf);
        }
        if self.max_features == Some(0) {
            return Err(ParamValidationError::InvalidVocabularySize);
        }
        Regex::new(&self.token_pattern).map_err(|e| ParamValidationError::InvalidTokenPattern(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// CountVectorizer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountVectorizer {
    params: CountParams,
    /// Term to column index, columns in lexicographic term order.
    vocabulary: BTreeMap<String, usize>,
}

impl CountVectorizer {
    pub fn new(params: CountParams) -> Self {
        Self {
            params,
            vocabulary: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &CountParams {
        &self.params
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, usize> {
        &self.vocabulary
    }

    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    /// Learn the vocabulary.
    ///
    /// Fails with [`ModelError::InvalidInput`] when no term survives
    /// `min_df` and the token pattern.
    pub fn fit(&mut self, documents: &[String]) -> ModelResult<()> {
        let pattern = self.compile()?;
        // term -> (document frequency, total count)
        let mut stats: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for document in documents {
            let mut seen: BTreeMap<String, usize> = BTreeMap::new();
            for term in self.analyze(document, &pattern) {
                *seen.entry(term).or_default() += 1;
            }
            for (term, count) in seen {
                let entry = stats.entry(term).or_default();
                entry.0 += 1;
                entry.1 += count;
            }
        }

        let mut retained: Vec<(String, usize)> = stats
            .into_iter()
            .filter(|(_, (df, _))| *df >= self.params.min_df)
            .map(|(term, (_, total))| (term, total))
            .collect();
        if let Some(limit) = self.params.max_features {
            if retained.len() > limit {
                retained.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                retained.truncate(limit);
            }
        }
        if retained.is_empty() {
            return Err(ModelError::invalid_input(
                "empty vocabulary: no document contains a term matching the token pattern",
            ));
        }

        let mut terms: Vec<String> = retained.into_iter().map(|(term, _)| term).collect();
        terms.sort();
        self.vocabulary = terms.into_iter().enumerate().map(|(i, term)| (term, i)).collect();
        debug!(n_documents = documents.len(), n_terms = self.vocabulary.len(), "vocabulary fitted");
        Ok(())
    }

    /// Count matrix `[n_documents, n_features]`; unknown terms are dropped.
    pub fn transform(&self, documents: &[String]) -> ModelResult<CsMat<f64>> {
        if !self.is_fitted() {
            return Err(ModelError::invalid_input("count vectorizer used before fit"));
        }
        let pattern = self.compile()?;
        let rows = documents
            .iter()
            .map(|document| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for term in self.analyze(document, &pattern) {
                    if let Some(&j) = self.vocabulary.get(&term) {
                        *counts.entry(j).or_default() += 1.0;
                    }
                }
                if self.params.binary {
                    counts.values_mut().for_each(|v| *v = 1.0);
                }
                counts.into_iter().collect::<Vec<_>>()
            })
            .collect();
        csr_from_rows(self.n_features(), rows)
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> ModelResult<CsMat<f64>> {
        self.fit(documents)?;
        self.transform(documents)
    }

    fn compile(&self) -> ModelResult<Regex> {
        Regex::new(&self.params.token_pattern)
            .map_err(|e| ParamValidationError::InvalidTokenPattern(e.to_string()).into())
    }

    fn analyze(&self, document: &str, pattern: &Regex) -> Vec<String> {
        let document = if self.params.lowercase {
            document.to_lowercase()
        } else {
            document.to_string()
        };
        let (min_n, max_n) = self.params.ngram_range;
        match self.params.analyzer {
            Analyzer::Word => {
                let tokens: Vec<&str> = pattern.find_iter(&document).map(|m| m.as_str()).collect();
                let mut grams = Vec::new();
                for n in min_n..=max_n {
                    grams.extend(tokens.windows(n).map(|window| window.join(" ")));
                }
                grams
            }
            Analyzer::Char => {
                let chars: Vec<char> = document.split_whitespace().collect::<Vec<_>>().join(" ").chars().collect();
                let mut grams = Vec::new();
                for n in min_n..=max_n {
                    grams.extend(chars.windows(n).map(|window| window.iter().collect::<String>()));
                }
                grams
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::text::to_dense;

    fn docs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn counts_words_of_two_chars_or_more() {
        let mut vectorizer = CountVectorizer::new(CountParams::default());
        let counts = vectorizer.fit_transform(&docs(&["The cat a cat", "the dog"])).unwrap();
        let terms: Vec<&str> = vectorizer.vocabulary().keys().map(String::as_str).collect();
        assert_eq!(terms, vec!["cat", "dog", "the"]);
        assert_eq!(to_dense(&counts), array![[2.0, 0.0, 1.0], [0.0, 1.0, 1.0]]);
    }

    #[test]
    fn bigrams_and_binary() {
        let params = CountParams::builder().ngram_range((1, 2)).binary(true).build().unwrap();
        let mut vectorizer = CountVectorizer::new(params);
        let counts = vectorizer.fit_transform(&docs(&["aa bb aa bb"])).unwrap();
        assert!(vectorizer.vocabulary().contains_key("aa bb"));
        assert!(vectorizer.vocabulary().contains_key("bb aa"));
        assert!(counts.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn min_df_and_max_features_prune() {
        let params = CountParams::builder().min_df(2).build().unwrap();
        let mut vectorizer = CountVectorizer::new(params);
        vectorizer.fit(&docs(&["alpha beta", "alpha gamma", "alpha beta"])).unwrap();
        assert_eq!(vectorizer.n_features(), 2);

        let params = CountParams::builder().max_features(1).build().unwrap();
        let mut vectorizer = CountVectorizer::new(params);
        vectorizer.fit(&docs(&["alpha beta", "alpha gamma"])).unwrap();
        let terms: Vec<&str> = vectorizer.vocabulary().keys().map(String::as_str).collect();
        assert_eq!(terms, vec!["alpha"]);
    }

    #[test]
    fn char_analyzer_collapses_whitespace() {
        let params = CountParams::builder().analyzer(Analyzer::Char).ngram_range((2, 2)).build().unwrap();
        let mut vectorizer = CountVectorizer::new(params);
        vectorizer.fit(&docs(&["ab   c"])).unwrap();
        let terms: Vec<&str> = vectorizer.vocabulary().keys().map(String::as_str).collect();
        assert_eq!(terms, vec![" c", "ab", "b "]);
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        let mut vectorizer = CountVectorizer::new(CountParams::default());
        assert!(matches!(vectorizer.fit(&docs(&["a b c", "!"])), Err(ModelError::InvalidInput(_))));
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(CountParams::builder().ngram_range((2, 1)).build().is_err());
        assert!(CountParams::builder().min_df(0).build().is_err());
        assert!(matches!(
            CountParams::builder().token_pattern("(").build(),
            Err(ParamValidationError::InvalidTokenPattern(_))
        ));
    }
}
