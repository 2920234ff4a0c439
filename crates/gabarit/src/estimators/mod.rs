//! Estimators wrapped by the concrete backends.
//!
//! - [`RegressionTree`]: gradient/hessian driven exact greedy tree
//! - [`GradientBoosting`]: logistic / softmax boosting over regression trees
//! - [`RandomForestRegressor`]: bagged regression trees
//! - [`LinearModel`]: elastic-net coordinate descent, logistic or squared loss

mod forest;
mod gbt;
mod linear;
mod tree;

pub use forest::{ForestParams, RandomForestRegressor};
pub use gbt::{GbtParams, GradientBoosting};
pub use linear::{LinearLoss, LinearModel, LinearParams};
pub use tree::{MaxFeatures, RegressionTree, TreeParams};

// =============================================================================
// Validation Errors
// =============================================================================

/// Hyper-parameter validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamValidationError {
    #[error("n_estimators must be at least 1")]
    InvalidNEstimators,

    #[error("learning_rate must be > 0, got {0}")]
    InvalidLearningRate(f64),

    #[error("lambda must be >= 0, got {0}")]
    InvalidLambda(f64),

    #[error("alpha must be >= 0, got {0}")]
    InvalidAlpha(f64),

    #[error("max_depth must be at least 1")]
    InvalidMaxDepth,

    #[error("min_samples_leaf must be at least 1")]
    InvalidMinSamplesLeaf,

    #[error("max_features fraction must be in (0, 1], got {0}")]
    InvalidMaxFeatures(f64),

    #[error("max_iter must be at least 1")]
    InvalidMaxIter,

    #[error("ngram_range must satisfy 1 <= min <= max, got ({min}, {max})")]
    InvalidNgramRange { min: usize, max: usize },

    #[error("min_df must be at least 1")]
    InvalidMinDf,

    #[error("max_features must be at least 1 when set")]
    InvalidVocabularySize,

    #[error("invalid token_pattern: {0}")]
    InvalidTokenPattern(String),
}
