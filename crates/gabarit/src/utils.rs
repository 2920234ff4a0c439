//! Shared helpers: parallelism switch, timestamps and row-wise numerics.

use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::ModelResult;

// =============================================================================
// Parallelism
// =============================================================================

/// Whether an estimator may use `rayon` internally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over `iter`, in parallel when allowed. Output order follows input order.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Timestamps
// =============================================================================

const DIR_STAMP: &[FormatItem<'static>] = format_description!("[year]_[month]_[day]-[hour]_[minute]_[second]");
const DATE_STAMP: &[FormatItem<'static>] = format_description!("[day]/[month]/[year] - [hour]:[minute]:[second]");

pub(crate) fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Stamp used in model directory names, e.g. `2024_03_01-09_30_00`.
pub(crate) fn dir_stamp(now: OffsetDateTime) -> ModelResult<String> {
    Ok(now.format(DIR_STAMP)?)
}

/// Human-readable date recorded in configuration documents.
pub(crate) fn date_stamp(now: OffsetDateTime) -> ModelResult<String> {
    Ok(now.format(DATE_STAMP)?)
}

// =============================================================================
// Row-wise numerics
// =============================================================================

/// Index of the largest value; the first one wins ties.
pub fn argmax(row: ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &value) in row.iter().enumerate() {
        if value > best_value {
            best = i;
            best_value = value;
        }
    }
    best
}

/// Scale every row to sum to one. All-zero rows become uniform.
pub fn normalize_rows(mut scores: Array2<f64>) -> Array2<f64> {
    let n_cols = scores.ncols();
    for mut row in scores.axis_iter_mut(Axis(0)) {
        let total: f64 = row.sum();
        if total > 0.0 && total.is_finite() {
            row.mapv_inplace(|v| v / total);
        } else if n_cols > 0 {
            row.fill(1.0 / n_cols as f64);
        }
    }
    scores
}

#[inline]
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
